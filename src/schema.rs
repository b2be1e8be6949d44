// ackchyually schema - invocation log and tool identity tables for Diesel ORM

diesel::table! {
    invocations (id) {
        id -> Integer,
        created_at -> Text,
        duration_ms -> BigInt,
        context_key -> Text,
        tool -> Text,
        exe_path -> Text,
        tool_id -> Nullable<Integer>,
        argv_json -> Text,
        exit_code -> Integer,
        mode -> Text,
        stdout_tail -> Text,
        stderr_tail -> Text,
        combined_tail -> Text,
    }
}

diesel::table! {
    tool_identities (id) {
        id -> Integer,
        exe_path -> Text,
        sha256 -> Text,
        version -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    tool_path_cache (path) {
        path -> Text,
        size -> BigInt,
        mtime_ns -> BigInt,
        sha256 -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    tags (id) {
        id -> Integer,
        created_at -> Text,
        context_key -> Text,
        label -> Text,
        tool -> Text,
        argv_json -> Text,
    }
}

diesel::joinable!(invocations -> tool_identities (tool_id));

diesel::allow_tables_to_appear_in_same_query!(invocations, tool_identities, tool_path_cache, tags,);
