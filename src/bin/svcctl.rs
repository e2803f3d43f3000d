//! svcctl CLI
//!
//! Manage services, secrets and service accounts kept in the local store.

use std::io;
use std::process::ExitCode;
use std::rc::Rc;

use svcctl::{build_command_tree, CliConfig, StoreDepsFactory};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let config = CliConfig::from_env();
    tracing::debug!(state = %config.state_path.display(), ingress = %config.ingress_url, "loaded configuration");

    let mut tree = build_command_tree(Rc::new(StoreDepsFactory::new(config)));
    let stdout = io::stdout();
    let stderr = io::stderr();
    let code = tree.run_to_exit_code(std::env::args_os(), &mut stdout.lock(), &mut stderr.lock());
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
