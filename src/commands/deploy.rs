//! `deploy`

use std::io::Write;
use std::rc::Rc;

use anyhow::bail;

use crate::command::Command;
use crate::deps::{DeploySpec, DepsFactory};
use crate::flags::{check_env_pair, check_not_blank, FlagSpec, Options, ParsedFlags, ServiceFlags};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    pub service_flags: ServiceFlags,
    pub image: Option<String>,
    pub git_url: Option<String>,
    pub git_revision: Option<String>,
    pub service_account: Option<String>,
    /// Raw `KEY=VALUE` entries in command-line order
    pub env: Vec<String>,
}

impl DeployOptions {
    /// Split `env` entries at the first `=`.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl Options for DeployOptions {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = ServiceFlags::flag_specs();
        specs.extend([
            FlagSpec::single("image", "Container image to run").short('i').validate(check_not_blank),
            FlagSpec::single("git-url", "Git repository to build the image from").validate(check_not_blank),
            FlagSpec::single("git-revision", "Git revision to build").validate(check_not_blank),
            FlagSpec::single("service-account", "Service account the build runs as").validate(check_not_blank),
            FlagSpec::repeated("env", "Environment variable as KEY=VALUE (repeatable)")
                .short('e')
                .validate(check_env_pair),
        ]);
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.service_flags.bind(flags);
        self.image = flags.single("image").map(str::to_string);
        self.git_url = flags.single("git-url").map(str::to_string);
        self.git_revision = flags.single("git-revision").map(str::to_string);
        self.service_account = flags.single("service-account").map(str::to_string);
        self.env = flags.repeated("env");
    }
}

pub fn new_deploy_cmd<D: DepsFactory>(deps: Rc<D>) -> Command<DeployOptions, D> {
    Command::new("deploy", "Create or update a service", DeployOptions::default(), deps, deploy)
}

fn deploy<D: DepsFactory>(opts: &DeployOptions, deps: &D, out: &mut dyn Write) -> anyhow::Result<()> {
    if opts.image.is_none() && opts.git_url.is_none() {
        bail!("one of --image or --git-url is required");
    }
    if opts.git_revision.is_some() && opts.git_url.is_none() {
        bail!("--git-revision requires --git-url");
    }

    let namespace = &opts.service_flags.namespace_flags.name;
    let name = &opts.service_flags.name;
    let mut client = deps.resource_client()?;
    let outcome = client.deploy(&DeploySpec {
        namespace: namespace.clone(),
        name: name.clone(),
        image: opts.image.clone(),
        git_url: opts.git_url.clone(),
        git_revision: opts.git_revision.clone(),
        service_account: opts.service_account.clone(),
        env: opts.env_pairs(),
    })?;

    let verb = if outcome.created { "created" } else { "updated" };
    writeln!(
        out,
        "Service '{}' {} in namespace '{}' (generation {})",
        name, verb, namespace, outcome.generation
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::NoopDepsFactory;
    use crate::error::ErrorKind;
    use crate::flags::NamespaceFlags;
    use crate::harness::TestCmd;

    fn test_cmd() -> TestCmd<DeployOptions, NoopDepsFactory> {
        TestCmd::new(new_deploy_cmd(Rc::new(NoopDepsFactory)))
    }

    fn expected() -> DeployOptions {
        DeployOptions {
            service_flags: ServiceFlags { namespace_flags: NamespaceFlags { name: "ns".into() }, name: "web".into() },
            image: Some("registry/web:v1".into()),
            git_url: Some("https://github.com/example/web".into()),
            git_revision: Some("v1".into()),
            service_account: Some("builder".into()),
            env: vec!["SIMPLE_MSG=hello world".into(), "B=x=y".into()],
        }
    }

    #[test]
    fn test_basic_config() {
        test_cmd().expect_basic_config();
    }

    #[test]
    fn test_short_and_long_names_agree() {
        let mut short = test_cmd();
        short.execute(&[
            "-n",
            "ns",
            "-s",
            "web",
            "-i",
            "registry/web:v1",
            "--git-url",
            "https://github.com/example/web",
            "--git-revision",
            "v1",
            "--service-account",
            "builder",
            "-e",
            "SIMPLE_MSG=hello world",
            "-e",
            "B=x=y",
        ]);
        short.expect_reaches_execution();
        short.expect_options(&expected());

        let mut long = test_cmd();
        long.execute(&[
            "--namespace",
            "ns",
            "--service",
            "web",
            "--image",
            "registry/web:v1",
            "--git-url",
            "https://github.com/example/web",
            "--git-revision",
            "v1",
            "--service-account",
            "builder",
            "--env",
            "SIMPLE_MSG=hello world",
            "--env",
            "B=x=y",
        ]);
        long.expect_reaches_execution();
        long.expect_options(short.options());
    }

    #[test]
    fn test_env_pairs_split_on_first_equals() {
        assert_eq!(
            expected().env_pairs(),
            vec![("SIMPLE_MSG".to_string(), "hello world".to_string()), ("B".into(), "x=y".into())]
        );
    }

    #[test]
    fn test_required_flags() {
        let mut cmd = test_cmd();
        cmd.execute(&["-e", "A=1"]);
        cmd.expect_required_flags(&["namespace", "service"]);
    }

    #[test]
    fn test_malformed_env_is_rejected_with_missing_flags() {
        let mut cmd = test_cmd();
        cmd.execute(&["-s", "web", "-e", "NOEQUALS"]);
        cmd.expect_not_reaches_execution();
        cmd.expect_required_flags(&["namespace"]);
        let err = cmd.error().unwrap();
        assert!(err.message.contains("invalid value for --env"), "{}", err.message);
    }

    #[test]
    fn test_handler_requires_an_image_source() {
        let mut cmd = new_deploy_cmd(Rc::new(NoopDepsFactory));
        let err = cmd.execute(&["-n", "ns", "-s", "web"], &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Backend);
        assert!(err.message.contains("--image or --git-url"));

        let mut out = Vec::new();
        cmd.execute(&["-n", "ns", "-s", "web", "-i", "img"], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Service 'web' created in namespace 'ns' (generation 1)\n"
        );
    }
}
