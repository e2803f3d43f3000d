//! `create service-account`

use std::io::Write;
use std::rc::Rc;

use crate::command::Command;
use crate::deps::{DepsFactory, ServiceAccountSpec};
use crate::flags::{check_not_blank, FlagSpec, Options, ParsedFlags, ServiceAccountFlags};

/// Secrets attached to a new service account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountCreateFlags {
    pub secrets: Vec<String>,
    pub image_pull_secrets: Vec<String>,
}

impl Options for ServiceAccountCreateFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        vec![
            FlagSpec::repeated("secret", "Secret the service account may use (repeatable)")
                .short('s')
                .validate(check_not_blank),
            FlagSpec::repeated("pull-secret", "Image pull secret (repeatable)")
                .short('p')
                .validate(check_not_blank),
        ]
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.secrets = flags.repeated("secret");
        self.image_pull_secrets = flags.repeated("pull-secret");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateServiceAccountOptions {
    pub service_account_flags: ServiceAccountFlags,
    pub create_flags: ServiceAccountCreateFlags,
}

impl Options for CreateServiceAccountOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = ServiceAccountFlags::flag_specs();
        specs.extend(ServiceAccountCreateFlags::flag_specs());
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.service_account_flags.bind(flags);
        self.create_flags.bind(flags);
    }
}

pub fn new_create_service_account_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<CreateServiceAccountOptions, D> {
    Command::new(
        "service-account",
        "Create a service account",
        CreateServiceAccountOptions::default(),
        deps,
        create_service_account,
    )
}

fn create_service_account<D: DepsFactory>(
    opts: &CreateServiceAccountOptions,
    deps: &D,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let namespace = &opts.service_account_flags.namespace_flags.name;
    let name = &opts.service_account_flags.name;
    let mut client = deps.resource_client()?;
    client.create_service_account(&ServiceAccountSpec {
        namespace: namespace.clone(),
        name: name.clone(),
        secrets: opts.create_flags.secrets.clone(),
        image_pull_secrets: opts.create_flags.image_pull_secrets.clone(),
    })?;
    writeln!(out, "Service account '{}' created in namespace '{}'", name, namespace)?;
    Ok(())
}
