//! svcctl: a command-line client for cluster services, and the harness it is tested with
//!
//! The crate has two halves. The CLI side declares typed flag schemas, builds
//! commands from them and dispatches to handlers that talk to an injected
//! backend. The testing side checks those commands without running them, and
//! drives the compiled binary through end-to-end scenarios.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `create service-account` | Create a service account with secrets |
//! | `create basic-auth-secret` | Store registry credentials |
//! | `deploy` | Create or update a service |
//! | `delete service` | Delete a service |
//! | `delete secret` | Delete a secret |
//! | `delete service-account` | Delete a service account |
//! | `list services` | List services, optionally as JSON |
//! | `curl` | GET a service through the ingress |
//!
//! # Testing
//!
//! ```rust,ignore
//! let mut cmd = TestCmd::new(new_deploy_cmd(Rc::new(NoopDepsFactory)));
//! cmd.execute(&["-e", "A=1"]);
//! cmd.expect_required_flags(&["namespace", "service"]);
//! ```
//!
//! End-to-end scenarios combine [`ProcessDriver`], [`Poller`] and
//! [`Scenario`]; cleanup runs before the steps and again on every exit path.

pub mod command;
pub mod commands;
mod config;
pub mod deps;
pub mod e2e;
mod error;
pub mod flags;
pub mod harness;
mod log;
pub mod poll;
pub mod process;
pub mod scenario;
pub mod store;

pub use command::{Command, CommandNode, CommandTree, Handler, Runnable};
pub use commands::build_command_tree;
pub use config::{CliConfig, DEFAULT_INGRESS_URL, INGRESS_ENV, STATE_ENV};
pub use deps::{DepsFactory, NoopDepsFactory, ResourceClient};
pub use error::{CapturedOutput, CtlError, ErrorKind};
pub use flags::{FlagSpec, FlagValue, Multiplicity, Options, ParsedFlags};
pub use harness::{assert_deep_eq, check_deep_eq, TestCmd};
pub use log::Logger;
pub use poll::{ContentSource, Expectation, PollConfig, Poller};
pub use process::{ProcessDriver, RunOpts, RunOutput, REDACTED};
pub use scenario::{Scenario, ScenarioReport};
pub use store::StoreDepsFactory;
