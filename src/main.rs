use ackchyually::{cli, logging, shim};
use std::ffi::OsString;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    let name = args
        .first()
        .map(|a| cli::invoked_name(a))
        .unwrap_or_default();

    let code = if name.is_empty() || cli::is_management_name(&name) {
        logging::init(logging::Mode::Management);
        cli::run(args)
    } else {
        // Busybox style: the basename is the tool.
        logging::init(logging::Mode::Shim);
        let rest: Vec<OsString> = args.into_iter().skip(1).collect();
        shim::run(&name, &rest)
    };

    std::process::exit(code);
}
