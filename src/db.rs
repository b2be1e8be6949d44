//! SQLite store with Diesel ORM
//!
//! Append-only log of shim invocations plus the tool-identity cache and
//! user tags. Every process opens the store, writes a row or two, and
//! exits; SQLite's write-ahead log keeps concurrent shims out of each
//! other's way.

use crate::schema::*;
use crate::score::Candidate;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Format a timestamp the way every table stores it: RFC 3339, UTC,
/// millisecond precision, so lexical order is chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn now_ts() -> String {
    format_ts(Utc::now())
}

// ============================================================================
// Domain types
// ============================================================================

/// One completed shim invocation, ready to append
#[derive(Debug, Clone)]
pub struct Invocation {
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub context_key: String,
    pub tool: String,
    pub exe_path: String,
    pub tool_id: Option<i32>,
    /// Redacted argv; first element is the tool base name
    pub argv: Vec<String>,
    pub exit_code: i32,
    /// "pty" | "pipes" | "cli"
    pub mode: String,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub combined_tail: String,
}

/// The parts of a stored invocation that callers read back
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedInvocation {
    pub argv: Vec<String>,
    pub exit_code: i32,
    pub mode: String,
    pub tool_id: Option<i32>,
    pub combined_tail: String,
}

/// A bookmarked command
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Tag {
    pub id: i32,
    pub created_at: String,
    pub context_key: String,
    pub label: String,
    pub tool: String,
    pub argv: Vec<String>,
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable invocation
#[derive(Insertable)]
#[diesel(table_name = invocations)]
pub struct NewInvocation<'a> {
    pub created_at: &'a str,
    pub duration_ms: i64,
    pub context_key: &'a str,
    pub tool: &'a str,
    pub exe_path: &'a str,
    pub tool_id: Option<i32>,
    pub argv_json: &'a str,
    pub exit_code: i32,
    pub mode: &'a str,
    pub stdout_tail: &'a str,
    pub stderr_tail: &'a str,
    pub combined_tail: &'a str,
}

/// Insertable tool identity
#[derive(Insertable)]
#[diesel(table_name = tool_identities)]
pub struct NewToolIdentity<'a> {
    pub exe_path: &'a str,
    pub sha256: &'a str,
    pub version: &'a str,
    pub created_at: &'a str,
}

/// Queryable tool identity
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, serde::Serialize)]
#[diesel(table_name = tool_identities)]
pub struct ToolIdentity {
    pub id: i32,
    pub exe_path: String,
    pub sha256: String,
    pub version: String,
    pub created_at: String,
}

/// Insertable / queryable path-cache row
#[derive(Insertable, Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = tool_path_cache)]
pub struct PathCacheEntry {
    pub path: String,
    pub size: i64,
    pub mtime_ns: i64,
    pub sha256: String,
    pub updated_at: String,
}

/// Insertable tag
#[derive(Insertable)]
#[diesel(table_name = tags)]
pub struct NewTag<'a> {
    pub created_at: &'a str,
    pub context_key: &'a str,
    pub label: &'a str,
    pub tool: &'a str,
    pub argv_json: &'a str,
}

/// Queryable tag row
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = tags)]
struct TagRow {
    id: i32,
    created_at: String,
    context_key: String,
    label: String,
    tool: String,
    argv_json: String,
}

impl TagRow {
    fn into_tag(self) -> Option<Tag> {
        let argv = decode_argv(&self.argv_json)?;
        Some(Tag {
            id: self.id,
            created_at: self.created_at,
            context_key: self.context_key,
            label: self.label,
            tool: self.tool,
            argv,
        })
    }
}

// ============================================================================
// Helper structs for raw SQL queries
// ============================================================================

/// Helper for grouped success queries
#[derive(QueryableByName, Debug)]
struct CandidateRow {
    #[diesel(sql_type = Text)]
    argv_json: String,
    #[diesel(sql_type = BigInt)]
    uses: i64,
    #[diesel(sql_type = Text)]
    last_seen: String,
}

/// Decode a stored argv, rejecting malformed or empty arrays.
fn decode_argv(json: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(json) {
        Ok(argv) if !argv.is_empty() => Some(argv),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed argv_json row");
            None
        }
    }
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas; `busy_timeout` is connection-scoped in SQLite.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Store handle with a small connection pool
pub struct Store {
    pool: DbPool,
    path: PathBuf,
}

/// Error type for store operations
#[derive(Debug)]
pub enum DbError {
    Connection(String),
    Query(diesel::result::Error),
    Pool(diesel::r2d2::Error),
    Io(std::io::Error),
    Serialize(serde_json::Error),
    Ownership { path: PathBuf, owner: u32 },
    Validation(String),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DbError::Query(e) => write!(f, "Query error: {}", e),
            DbError::Pool(e) => write!(f, "Pool error: {}", e),
            DbError::Io(e) => write!(f, "IO error: {}", e),
            DbError::Serialize(e) => write!(f, "Serialization error: {}", e),
            DbError::Ownership { path, owner } => write!(
                f,
                "refusing to open {} as root: it belongs to uid {} (run without sudo, or fix ownership)",
                path.display(),
                owner
            ),
            DbError::Validation(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for DbError {}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        DbError::Query(e)
    }
}

impl From<diesel::r2d2::Error> for DbError {
    fn from(e: diesel::r2d2::Error) -> Self {
        DbError::Pool(e)
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialize(e)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Create `dir` (and parents) with mode 0755.
fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new().recursive(true).mode(0o755).create(dir)
    }
    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// When running as root, refuse a database (or, if absent, its directory)
/// owned by someone else: writing it would leave a root-owned WAL behind
/// that the real user can no longer open.
#[cfg(unix)]
fn check_ownership(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        return Ok(());
    }

    let target = if path.exists() {
        path
    } else {
        match path.parent() {
            Some(parent) => parent,
            None => return Ok(()),
        }
    };

    let owner = std::fs::metadata(target)?.uid();
    if owner != 0 {
        return Err(DbError::Ownership {
            path: target.to_path_buf(),
            owner,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_ownership(_path: &Path) -> Result<()> {
    Ok(())
}

impl Store {
    /// Get the database path that will be used
    pub fn db_path() -> PathBuf {
        crate::paths::db_path()
    }

    /// Open the store at its well-known location
    pub fn open() -> Result<Self> {
        Self::open_at(Self::db_path())
    }

    /// Open the store at a specific path, creating it if needed
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }
        check_ownership(&path)?;

        let path_str = path.to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(2)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let store = Self { pool, path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        // Best-effort: some filesystems cannot host a WAL.
        if let Err(e) = conn.batch_execute("PRAGMA journal_mode = WAL;") {
            tracing::debug!(error = %e, "could not enable WAL");
        }

        // Additive only: new columns go in with ALTER TABLE, never drops.
        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tool_identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                exe_path TEXT NOT NULL,
                sha256 TEXT NOT NULL UNIQUE,
                version TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tool_path_cache (
                path TEXT PRIMARY KEY NOT NULL,
                size INTEGER NOT NULL,
                mtime_ns INTEGER NOT NULL,
                sha256 TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS invocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                created_at TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                context_key TEXT NOT NULL,
                tool TEXT NOT NULL,
                exe_path TEXT NOT NULL,
                tool_id INTEGER,
                argv_json TEXT NOT NULL,
                exit_code INTEGER NOT NULL,
                mode TEXT NOT NULL,
                stdout_tail TEXT NOT NULL DEFAULT '',
                stderr_tail TEXT NOT NULL DEFAULT '',
                combined_tail TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (tool_id) REFERENCES tool_identities(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                created_at TEXT NOT NULL,
                context_key TEXT NOT NULL,
                label TEXT NOT NULL,
                tool TEXT NOT NULL,
                argv_json TEXT NOT NULL,
                UNIQUE(context_key, label)
            )
        "#).execute(&mut conn)?;

        // Create indexes
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_invocations_lookup ON invocations(tool, context_key, exit_code, created_at)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_tags_context ON tags(context_key, tool)").execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Invocation Log
    // ========================================================================

    /// Append one invocation row. Returns the new row id.
    pub fn append_invocation(&self, inv: &Invocation) -> Result<i32> {
        if inv.argv.first().map(String::as_str) != Some(inv.tool.as_str()) {
            return Err(DbError::Validation(format!(
                "argv must start with the tool name {:?}",
                inv.tool
            )));
        }

        let mut conn = self.get_conn()?;
        let created_at = format_ts(inv.started_at);
        let argv_json = serde_json::to_string(&inv.argv)?;

        let row = NewInvocation {
            created_at: &created_at,
            duration_ms: inv.duration_ms,
            context_key: &inv.context_key,
            tool: &inv.tool,
            exe_path: &inv.exe_path,
            tool_id: inv.tool_id,
            argv_json: &argv_json,
            exit_code: inv.exit_code,
            mode: &inv.mode,
            stdout_tail: &inv.stdout_tail,
            stderr_tail: &inv.stderr_tail,
            combined_tail: &inv.combined_tail,
        };

        diesel::insert_into(invocations::table)
            .values(&row)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
            .first(&mut conn)?;

        Ok(id)
    }

    /// Argv lists of successful runs of `tool` in `ctx`, newest first.
    /// Malformed rows are skipped.
    pub fn list_successful(&self, tool: &str, ctx: &str, limit: i64) -> Result<Vec<Vec<String>>> {
        let mut conn = self.get_conn()?;
        let rows: Vec<String> = invocations::table
            .filter(invocations::tool.eq(tool))
            .filter(invocations::context_key.eq(ctx))
            .filter(invocations::exit_code.eq(0))
            .order((invocations::created_at.desc(), invocations::id.desc()))
            .select(invocations::argv_json)
            .limit(limit)
            .load(&mut conn)?;

        Ok(rows.iter().filter_map(|json| decode_argv(json)).collect())
    }

    /// Distinct successful argvs with repeat counts, most recently used first.
    pub fn list_success_candidates(&self, tool: &str, ctx: &str, limit: i64) -> Result<Vec<Candidate>> {
        let mut conn = self.get_conn()?;
        let rows: Vec<CandidateRow> = diesel::sql_query(
            "SELECT argv_json, COUNT(*) AS uses, MAX(created_at) AS last_seen
             FROM invocations
             WHERE tool = ? AND context_key = ? AND exit_code = 0
             GROUP BY argv_json
             ORDER BY last_seen DESC
             LIMIT ?",
        )
        .bind::<Text, _>(tool)
        .bind::<Text, _>(ctx)
        .bind::<BigInt, _>(limit)
        .load(&mut conn)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let argv = decode_argv(&row.argv_json)?;
                let last_seen = parse_ts(&row.last_seen)?;
                Some(Candidate {
                    argv,
                    count: row.uses,
                    last_seen,
                })
            })
            .collect())
    }

    /// Count of all logged invocations (diagnostics and tests)
    pub fn invocation_count(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        let n = invocations::table.count().get_result(&mut conn)?;
        Ok(n)
    }

    /// Newest logged row for `tool`, if any
    pub fn last_invocation(&self, tool: &str) -> Result<Option<LoggedInvocation>> {
        let mut conn = self.get_conn()?;
        let row: Option<(String, i32, String, Option<i32>, String)> = invocations::table
            .filter(invocations::tool.eq(tool))
            .order(invocations::id.desc())
            .select((
                invocations::argv_json,
                invocations::exit_code,
                invocations::mode,
                invocations::tool_id,
                invocations::combined_tail,
            ))
            .first(&mut conn)
            .optional()?;
        Ok(row.and_then(|(json, exit_code, mode, tool_id, combined_tail)| {
            decode_argv(&json).map(|argv| LoggedInvocation {
                argv,
                exit_code,
                mode,
                tool_id,
                combined_tail,
            })
        }))
    }

    // ========================================================================
    // Tool Identity
    // ========================================================================

    pub fn get_path_cache(&self, path: &str) -> Result<Option<PathCacheEntry>> {
        let mut conn = self.get_conn()?;
        let row = tool_path_cache::table
            .filter(tool_path_cache::path.eq(path))
            .select(PathCacheEntry::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    pub fn upsert_path_cache(&self, path: &str, size: i64, mtime_ns: i64, sha256: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_ts();
        let row = PathCacheEntry {
            path: path.to_string(),
            size,
            mtime_ns,
            sha256: sha256.to_string(),
            updated_at: now.clone(),
        };

        diesel::insert_into(tool_path_cache::table)
            .values(&row)
            .on_conflict(tool_path_cache::path)
            .do_update()
            .set((
                tool_path_cache::size.eq(size),
                tool_path_cache::mtime_ns.eq(mtime_ns),
                tool_path_cache::sha256.eq(sha256),
                tool_path_cache::updated_at.eq(&now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn identity_by_sha(&self, sha256: &str) -> Result<Option<ToolIdentity>> {
        let mut conn = self.get_conn()?;
        let row = tool_identities::table
            .filter(tool_identities::sha256.eq(sha256))
            .select(ToolIdentity::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    /// Insert an identity unless one with the same hash exists; returns the
    /// stored row either way.
    pub fn insert_identity(&self, exe_path: &str, sha256: &str, version: &str) -> Result<ToolIdentity> {
        {
            let mut conn = self.get_conn()?;
            let now = now_ts();
            let row = NewToolIdentity {
                exe_path,
                sha256,
                version,
                created_at: &now,
            };
            diesel::insert_or_ignore_into(tool_identities::table)
                .values(&row)
                .execute(&mut conn)?;
        }

        self.identity_by_sha(sha256)?
            .ok_or_else(|| DbError::Validation(format!("identity {} vanished after insert", sha256)))
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Insert or replace the tag `label` in `ctx`.
    pub fn upsert_tag(&self, ctx: &str, label: &str, tool: &str, argv: &[String]) -> Result<()> {
        if label.trim().is_empty() {
            return Err(DbError::Validation("tag label must not be empty".to_string()));
        }
        let mut conn = self.get_conn()?;
        let now = now_ts();
        let argv_json = serde_json::to_string(argv)?;
        let row = NewTag {
            created_at: &now,
            context_key: ctx,
            label,
            tool,
            argv_json: &argv_json,
        };

        diesel::insert_into(tags::table)
            .values(&row)
            .on_conflict((tags::context_key, tags::label))
            .do_update()
            .set((tags::tool.eq(tool), tags::argv_json.eq(&argv_json)))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_tag(&self, ctx: &str, label: &str) -> Result<Option<Tag>> {
        let mut conn = self.get_conn()?;
        let row = tags::table
            .filter(tags::context_key.eq(ctx))
            .filter(tags::label.eq(label))
            .select(TagRow::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row.and_then(TagRow::into_tag))
    }

    /// Tags in `ctx`, optionally narrowed to one tool, ordered by label.
    pub fn list_tags(&self, ctx: &str, tool: Option<&str>) -> Result<Vec<Tag>> {
        let mut conn = self.get_conn()?;
        let mut query = tags::table
            .filter(tags::context_key.eq(ctx))
            .select(TagRow::as_select())
            .order(tags::label.asc())
            .into_boxed();
        if let Some(tool) = tool {
            query = query.filter(tags::tool.eq(tool));
        }
        let rows = query.load(&mut conn)?;
        Ok(rows.into_iter().filter_map(TagRow::into_tag).collect())
    }

    /// Raw insert used by tests to plant malformed rows.
    #[cfg(test)]
    fn insert_raw_argv_json(&self, tool: &str, ctx: &str, argv_json: &str, exit_code: i32) -> Result<()> {
        let mut conn = self.get_conn()?;
        let now = now_ts();
        diesel::insert_into(invocations::table)
            .values(&NewInvocation {
                created_at: &now,
                duration_ms: 0,
                context_key: ctx,
                tool,
                exe_path: "/bin/true",
                tool_id: None,
                argv_json,
                exit_code,
                mode: "pipes",
                stdout_tail: "",
                stderr_tail: "",
                combined_tail: "",
            })
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_at(tmp.path().join("data").join("ackchyually.sqlite")).unwrap();
        (tmp, store)
    }

    fn inv(tool: &str, ctx: &str, args: &[&str], code: i32, at: DateTime<Utc>) -> Invocation {
        let mut argv = vec![tool.to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        Invocation {
            started_at: at,
            duration_ms: 12,
            context_key: ctx.to_string(),
            tool: tool.to_string(),
            exe_path: format!("/usr/bin/{}", tool),
            tool_id: None,
            argv,
            exit_code: code,
            mode: "pipes".to_string(),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            combined_tail: String::new(),
        }
    }

    #[test]
    fn test_open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ackchyually.sqlite");
        {
            let s = Store::open_at(&path).unwrap();
            s.append_invocation(&inv("git", "cwd:/x", &["status"], 0, Utc::now())).unwrap();
        }
        let s = Store::open_at(&path).unwrap();
        assert_eq!(s.invocation_count().unwrap(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_data_dir_mode() {
        use std::os::unix::fs::PermissionsExt;
        let (tmp, _s) = store();
        let mode = std::fs::metadata(tmp.path().join("data")).unwrap().permissions().mode();
        assert_eq!(mode & 0o022, 0, "group/world must not be able to write");
        assert_eq!(mode & 0o700, 0o700);
    }

    #[test]
    fn test_append_rejects_argv_without_tool_head() {
        let (_tmp, s) = store();
        let mut bad = inv("git", "cwd:/x", &["status"], 0, Utc::now());
        bad.argv[0] = "gti".to_string();
        assert!(matches!(s.append_invocation(&bad), Err(DbError::Validation(_))));
    }

    #[test]
    fn test_list_successful_filters_and_orders() {
        let (_tmp, s) = store();
        let t0 = Utc::now() - ChronoDuration::hours(2);
        s.append_invocation(&inv("git", "git:/repo", &["status"], 0, t0)).unwrap();
        s.append_invocation(&inv("git", "git:/repo", &["stauts"], 1, t0 + ChronoDuration::minutes(1))).unwrap();
        s.append_invocation(&inv("git", "git:/other", &["log"], 0, t0 + ChronoDuration::minutes(2))).unwrap();
        s.append_invocation(&inv("git", "git:/repo", &["diff"], 0, t0 + ChronoDuration::minutes(3))).unwrap();
        s.append_invocation(&inv("go", "git:/repo", &["test"], 0, t0 + ChronoDuration::minutes(4))).unwrap();

        let got = s.list_successful("git", "git:/repo", 10).unwrap();
        assert_eq!(got, vec![
            vec!["git".to_string(), "diff".to_string()],
            vec!["git".to_string(), "status".to_string()],
        ]);

        let limited = s.list_successful("git", "git:/repo", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let (_tmp, s) = store();
        s.insert_raw_argv_json("git", "cwd:/x", "{not json", 0).unwrap();
        s.insert_raw_argv_json("git", "cwd:/x", "[]", 0).unwrap();
        s.append_invocation(&inv("git", "cwd:/x", &["status"], 0, Utc::now())).unwrap();

        assert_eq!(s.list_successful("git", "cwd:/x", 10).unwrap().len(), 1);
        assert_eq!(s.list_success_candidates("git", "cwd:/x", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_candidates_group_and_count() {
        let (_tmp, s) = store();
        let t0 = Utc::now() - ChronoDuration::days(3);
        for i in 0..3 {
            s.append_invocation(&inv("go", "cwd:/p", &["test", "./..."], 0, t0 + ChronoDuration::hours(i))).unwrap();
        }
        s.append_invocation(&inv("go", "cwd:/p", &["build"], 0, t0 + ChronoDuration::days(1))).unwrap();
        s.append_invocation(&inv("go", "cwd:/p", &["biuld"], 1, t0 + ChronoDuration::days(2))).unwrap();

        let c = s.list_success_candidates("go", "cwd:/p", 10).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].argv, vec!["go", "build"]);
        assert_eq!(c[0].count, 1);
        assert_eq!(c[1].argv, vec!["go", "test", "./..."]);
        assert_eq!(c[1].count, 3);
        assert!(c[1].last_seen > t0 + ChronoDuration::minutes(90));
    }

    #[test]
    fn test_path_cache_upsert_replaces() {
        let (_tmp, s) = store();
        assert!(s.get_path_cache("/usr/bin/git").unwrap().is_none());
        s.upsert_path_cache("/usr/bin/git", 10, 100, "aa").unwrap();
        s.upsert_path_cache("/usr/bin/git", 11, 200, "bb").unwrap();
        let row = s.get_path_cache("/usr/bin/git").unwrap().unwrap();
        assert_eq!((row.size, row.mtime_ns, row.sha256.as_str()), (11, 200, "bb"));
    }

    #[test]
    fn test_identity_unique_by_hash() {
        let (_tmp, s) = store();
        let a = s.insert_identity("/usr/bin/git", "abc", "git 2.43.0").unwrap();
        let b = s.insert_identity("/opt/git/bin/git", "abc", "git other").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.exe_path, "/usr/bin/git");
        assert_eq!(s.identity_by_sha("abc").unwrap().unwrap().version, "git 2.43.0");
    }

    #[test]
    fn test_tags_upsert_by_context_and_label() {
        let (_tmp, s) = store();
        let argv1 = vec!["make".to_string(), "test".to_string()];
        let argv2 = vec!["make".to_string(), "check".to_string()];
        s.upsert_tag("cwd:/a", "ci", "make", &argv1).unwrap();
        s.upsert_tag("cwd:/a", "ci", "make", &argv2).unwrap();
        s.upsert_tag("cwd:/b", "ci", "make", &argv1).unwrap();
        s.upsert_tag("cwd:/a", "fmt", "cargo", &["cargo".to_string(), "fmt".to_string()]).unwrap();

        assert_eq!(s.get_tag("cwd:/a", "ci").unwrap().unwrap().argv, argv2);
        assert_eq!(s.get_tag("cwd:/b", "ci").unwrap().unwrap().argv, argv1);
        assert!(s.get_tag("cwd:/c", "ci").unwrap().is_none());

        let all = s.list_tags("cwd:/a", None).unwrap();
        assert_eq!(all.iter().map(|t| t.label.as_str()).collect::<Vec<_>>(), vec!["ci", "fmt"]);
        let make_only = s.list_tags("cwd:/a", Some("make")).unwrap();
        assert_eq!(make_only.len(), 1);
        assert!(s.upsert_tag("cwd:/a", "  ", "make", &argv1).is_err());
    }

    #[test]
    fn test_last_invocation() {
        let (_tmp, s) = store();
        assert!(s.last_invocation("git").unwrap().is_none());
        s.append_invocation(&inv("git", "cwd:/x", &["stauts"], 64, Utc::now())).unwrap();
        let last = s.last_invocation("git").unwrap().unwrap();
        assert_eq!(last.argv, vec!["git", "stauts"]);
        assert_eq!(last.exit_code, 64);
        assert_eq!(last.tool_id, None);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = Utc::now();
        let b = a + ChronoDuration::milliseconds(5);
        assert!(format_ts(a) < format_ts(b));
        assert_eq!(parse_ts(&format_ts(a)).map(|t| t.timestamp_millis()), Some(a.timestamp_millis()));
    }
}
