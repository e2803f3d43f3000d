//! `delete service`, `delete secret`, `delete service-account`

use std::io::Write;
use std::rc::Rc;

use crate::command::Command;
use crate::deps::DepsFactory;
use crate::flags::{FlagSpec, Options, ParsedFlags, SecretFlags, ServiceAccountFlags, ServiceFlags};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteServiceOptions {
    pub service_flags: ServiceFlags,
}

impl Options for DeleteServiceOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        ServiceFlags::flag_specs()
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.service_flags.bind(flags);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSecretOptions {
    pub secret_flags: SecretFlags,
}

impl Options for DeleteSecretOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        SecretFlags::flag_specs()
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.secret_flags.bind(flags);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteServiceAccountOptions {
    pub service_account_flags: ServiceAccountFlags,
}

impl Options for DeleteServiceAccountOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        ServiceAccountFlags::flag_specs()
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.service_account_flags.bind(flags);
    }
}

pub fn new_delete_service_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<DeleteServiceOptions, D> {
    Command::new("service", "Delete a service", DeleteServiceOptions::default(), deps, delete_service)
}

pub fn new_delete_secret_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<DeleteSecretOptions, D> {
    Command::new("secret", "Delete a secret", DeleteSecretOptions::default(), deps, delete_secret)
}

pub fn new_delete_service_account_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<DeleteServiceAccountOptions, D> {
    Command::new(
        "service-account",
        "Delete a service account",
        DeleteServiceAccountOptions::default(),
        deps,
        delete_service_account,
    )
}

fn delete_service<D: DepsFactory>(opts: &DeleteServiceOptions, deps: &D, out: &mut dyn Write) -> anyhow::Result<()> {
    let namespace = &opts.service_flags.namespace_flags.name;
    let name = &opts.service_flags.name;
    deps.resource_client()?.delete_service(namespace, name)?;
    writeln!(out, "Service '{}' deleted in namespace '{}'", name, namespace)?;
    Ok(())
}

fn delete_secret<D: DepsFactory>(opts: &DeleteSecretOptions, deps: &D, out: &mut dyn Write) -> anyhow::Result<()> {
    let namespace = &opts.secret_flags.namespace_flags.name;
    let name = &opts.secret_flags.name;
    deps.resource_client()?.delete_secret(namespace, name)?;
    writeln!(out, "Secret '{}' deleted in namespace '{}'", name, namespace)?;
    Ok(())
}

fn delete_service_account<D: DepsFactory>(
    opts: &DeleteServiceAccountOptions,
    deps: &D,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let namespace = &opts.service_account_flags.namespace_flags.name;
    let name = &opts.service_account_flags.name;
    deps.resource_client()?.delete_service_account(namespace, name)?;
    writeln!(out, "Service account '{}' deleted in namespace '{}'", name, namespace)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::NoopDepsFactory;
    use crate::harness::TestCmd;

    #[test]
    fn test_delete_service_flags() {
        let mut cmd = TestCmd::new(new_delete_service_cmd(Rc::new(NoopDepsFactory)));
        cmd.expect_basic_config();
        cmd.execute(&[]);
        cmd.expect_required_flags(&["namespace", "service"]);
        cmd.execute(&["--namespace", "ns", "--service", "web"]);
        cmd.expect_reaches_execution();
        assert_eq!(cmd.options().service_flags.name, "web");
    }

    #[test]
    fn test_delete_secret_flags() {
        let mut cmd = TestCmd::new(new_delete_secret_cmd(Rc::new(NoopDepsFactory)));
        cmd.expect_basic_config();
        cmd.execute(&["-n", "ns"]);
        cmd.expect_required_flags(&["secret"]);
        cmd.execute(&["-n", "ns", "-s", "docker"]);
        cmd.expect_reaches_execution();
        assert_eq!(cmd.options().secret_flags.name, "docker");
    }

    #[test]
    fn test_delete_service_account_flags() {
        let mut cmd = TestCmd::new(new_delete_service_account_cmd(Rc::new(NoopDepsFactory)));
        cmd.expect_basic_config();
        cmd.execute(&["-a", "builder"]);
        cmd.expect_required_flags(&["namespace"]);
        cmd.execute(&["-n", "ns", "-a", "builder"]);
        cmd.expect_reaches_execution();
        assert_eq!(cmd.options().service_account_flags.namespace_flags.name, "ns");
    }
}
