//! `create basic-auth-secret`

use std::io::Write;
use std::rc::Rc;

use anyhow::bail;

use crate::command::Command;
use crate::deps::{BasicAuthSecretSpec, DepsFactory};
use crate::flags::{check_not_blank, FlagSpec, Options, ParsedFlags, SecretFlags};

/// Registry server used with `--docker-hub`
pub const DOCKER_HUB_SERVER: &str = "https://index.docker.io/v1/";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct BasicAuthSecretFlags {
    pub docker_hub: bool,
    pub server: Option<String>,
    pub username: String,
    pub password: String,
}

// Keep the password out of debug logging.
impl std::fmt::Debug for BasicAuthSecretFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthSecretFlags")
            .field("docker_hub", &self.docker_hub)
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { crate::process::REDACTED })
            .finish()
    }
}

impl BasicAuthSecretFlags {
    /// The registry server the credentials are for.
    pub fn resolve_server(&self) -> anyhow::Result<String> {
        match (self.docker_hub, self.server.as_deref()) {
            (true, Some(_)) => bail!("--docker-hub and --server are mutually exclusive"),
            (true, None) => Ok(DOCKER_HUB_SERVER.to_string()),
            (false, Some(server)) => Ok(server.to_string()),
            (false, None) => bail!("one of --docker-hub or --server is required"),
        }
    }
}

impl Options for BasicAuthSecretFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        vec![
            FlagSpec::switch("docker-hub", "Use Docker Hub as the registry server"),
            FlagSpec::single("server", "Registry server URL").validate(check_not_blank),
            FlagSpec::single("username", "Registry user").short('u'),
            FlagSpec::single("password", "Registry password").short('p'),
        ]
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.docker_hub = flags.switch("docker-hub");
        self.server = flags.single("server").map(str::to_string);
        self.username = flags.string("username");
        self.password = flags.string("password");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBasicAuthSecretOptions {
    pub secret_flags: SecretFlags,
    pub basic_auth_flags: BasicAuthSecretFlags,
}

impl Options for CreateBasicAuthSecretOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = SecretFlags::flag_specs();
        specs.extend(BasicAuthSecretFlags::flag_specs());
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.secret_flags.bind(flags);
        self.basic_auth_flags.bind(flags);
    }
}

pub fn new_create_basic_auth_secret_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<CreateBasicAuthSecretOptions, D> {
    Command::new(
        "basic-auth-secret",
        "Create a secret holding registry credentials",
        CreateBasicAuthSecretOptions::default(),
        deps,
        create_basic_auth_secret,
    )
}

fn create_basic_auth_secret<D: DepsFactory>(
    opts: &CreateBasicAuthSecretOptions,
    deps: &D,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let server = opts.basic_auth_flags.resolve_server()?;
    let namespace = &opts.secret_flags.namespace_flags.name;
    let name = &opts.secret_flags.name;
    let mut client = deps.resource_client()?;
    client.create_basic_auth_secret(&BasicAuthSecretSpec {
        namespace: namespace.clone(),
        name: name.clone(),
        server,
        username: opts.basic_auth_flags.username.clone(),
        password: opts.basic_auth_flags.password.clone(),
    })?;
    writeln!(out, "Secret '{}' created in namespace '{}'", name, namespace)?;
    Ok(())
}
