//! `curl`: fetch a service's response through the ingress

use std::io::Write;
use std::rc::Rc;

use crate::command::Command;
use crate::deps::DepsFactory;
use crate::flags::{FlagSpec, Options, ParsedFlags, ServiceFlags};
use crate::poll::{ContentSource, HttpSource};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurlOptions {
    pub service_flags: ServiceFlags,
    pub verbose: bool,
}

impl Options for CurlOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = ServiceFlags::flag_specs();
        specs.push(FlagSpec::switch("verbose", "Print the request before the response body").short('v'));
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.service_flags.bind(flags);
        self.verbose = flags.switch("verbose");
    }
}

pub fn new_curl_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<CurlOptions, D> {
    Command::new("curl", "Send a GET request to a service", CurlOptions::default(), deps, curl)
}

fn curl<D: DepsFactory>(opts: &CurlOptions, deps: &D, out: &mut dyn Write) -> anyhow::Result<()> {
    let namespace = &opts.service_flags.namespace_flags.name;
    let endpoint = deps.resource_client()?.service_endpoint(namespace, &opts.service_flags.name)?;
    if opts.verbose {
        writeln!(out, "> GET {}", endpoint.url)?;
        writeln!(out, "> Host: {}", endpoint.host)?;
    }
    let mut source = HttpSource::new(endpoint.url.as_str()).with_host(endpoint.host.as_str());
    let body = source.fetch()?;
    write!(out, "{}", body)?;
    Ok(())
}
