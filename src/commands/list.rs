//! `list services`

use std::io::Write;
use std::rc::Rc;

use serde::Serialize;

use crate::command::Command;
use crate::deps::{DepsFactory, ServiceSummary};
use crate::flags::{check_not_blank, FlagSpec, Options, ParsedFlags};

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListServicesOptions {
    pub namespace: String,
    pub json: bool,
}

impl Options for ListServicesOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        vec![
            FlagSpec::single("namespace", "Namespace to list")
                .short('n')
                .default_value(DEFAULT_NAMESPACE)
                .validate(check_not_blank),
            FlagSpec::switch("json", "Print the list as JSON"),
        ]
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.namespace = flags.string("namespace");
        self.json = flags.switch("json");
    }
}

#[derive(Serialize)]
struct ServiceList<'a> {
    services: &'a [ServiceSummary],
}

pub fn new_list_services_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<ListServicesOptions, D> {
    Command::new("services", "List services", ListServicesOptions::default(), deps, list_services)
}

fn list_services<D: DepsFactory>(opts: &ListServicesOptions, deps: &D, out: &mut dyn Write) -> anyhow::Result<()> {
    let services = deps.resource_client()?.list_services(&opts.namespace)?;
    if opts.json {
        serde_json::to_writer(&mut *out, &ServiceList { services: &services })?;
        writeln!(out)?;
        return Ok(());
    }
    for service in &services {
        writeln!(out, "{}", service.name)?;
    }
    Ok(())
}
