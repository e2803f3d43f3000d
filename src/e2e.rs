//! Deploy-with-build end-to-end scenarios
//!
//! Drives the compiled `svcctl` binary (and the cluster's own CLI for the
//! registry pull secret) through a full service lifecycle: credentials,
//! service account, two deploys with content polling in between, deletion.

use std::fmt;

use crate::error::CtlError;
use crate::log::Logger;
use crate::poll::{CliCurlSource, Expectation, PollConfig, Poller};
use crate::process::{ProcessDriver, RunOpts};
use crate::scenario::{Scenario, ScenarioReport};

pub const NAMESPACE_ENV: &str = "SVCCTL_E2E_NAMESPACE";
pub const BINARY_ENV: &str = "SVCCTL_E2E_BINARY";
pub const KUBECTL_ENV: &str = "SVCCTL_E2E_KUBECTL";

pub const EXPECTED_CONTENT_V1: &str = "TestDeployWithBuild_ContentV1";
pub const EXPECTED_CONTENT_V2: &str = "TestDeployWithBuild_ContentV2";

/// Registry the pull secret points at
const DOCKER_REGISTRY_SERVER: &str = "https://index.docker.io";

/// Settings for the live scenarios, read from `SVCCTL_E2E_*`
#[derive(Clone, PartialEq, Eq)]
pub struct E2eEnv {
    pub namespace: String,
    pub binary: String,
    /// Cluster CLI; `kubectl` unless `SVCCTL_E2E_KUBECTL` says otherwise
    pub kubectl: String,
    pub build_git_url: String,
    pub build_git_revision_v1: String,
    pub build_git_revision_v2: String,
    pub build_public_image: String,
    pub build_private_image: String,
    pub docker_username: String,
    pub docker_password: String,
}

impl fmt::Debug for E2eEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eEnv")
            .field("namespace", &self.namespace)
            .field("binary", &self.binary)
            .field("kubectl", &self.kubectl)
            .field("build_git_url", &self.build_git_url)
            .field("build_git_revision_v1", &self.build_git_revision_v1)
            .field("build_git_revision_v2", &self.build_git_revision_v2)
            .field("build_public_image", &self.build_public_image)
            .field("build_private_image", &self.build_private_image)
            .field("docker_username", &self.docker_username)
            .finish_non_exhaustive()
    }
}

impl E2eEnv {
    pub fn from_env() -> Result<Self, CtlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Every missing variable is reported in one error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CtlError> {
        let mut missing = Vec::new();
        let mut required = |key: &str| match lookup(key).filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => {
                missing.push(key.to_string());
                String::new()
            }
        };

        let env = E2eEnv {
            namespace: required(NAMESPACE_ENV),
            binary: required(BINARY_ENV),
            kubectl: String::new(),
            build_git_url: required("SVCCTL_E2E_BUILD_GIT_URL"),
            build_git_revision_v1: required("SVCCTL_E2E_BUILD_GIT_REVISION_V1"),
            build_git_revision_v2: required("SVCCTL_E2E_BUILD_GIT_REVISION_V2"),
            build_public_image: required("SVCCTL_E2E_BUILD_PUBLIC_IMAGE"),
            build_private_image: required("SVCCTL_E2E_BUILD_PRIVATE_IMAGE"),
            docker_username: required("SVCCTL_E2E_DOCKER_USERNAME"),
            docker_password: required("SVCCTL_E2E_DOCKER_PASSWORD"),
        };

        if !missing.is_empty() {
            return Err(CtlError::validation(format!(
                "missing e2e environment variable(s): {}",
                missing.join(", ")
            ))
            .with_missing_flags(missing));
        }

        let kubectl = lookup(KUBECTL_ENV).filter(|v| !v.is_empty()).unwrap_or_else(|| "kubectl".into());
        Ok(E2eEnv { kubectl, ..env })
    }

    pub fn image(&self, visibility: ImageVisibility) -> &str {
        match visibility {
            ImageVisibility::Public => &self.build_public_image,
            ImageVisibility::Private => &self.build_private_image,
        }
    }
}

/// Whether the built image is pushed to a public or a private repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVisibility {
    Public,
    Private,
}

/// Resource names used by one scenario variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioNames {
    pub service: String,
    pub push_secret: String,
    pub pull_secret: Option<String>,
    pub service_account: String,
}

impl ScenarioNames {
    pub fn new(visibility: ImageVisibility) -> Self {
        let service = match visibility {
            ImageVisibility::Public => "test-d-w-b-pub-i-service-name",
            ImageVisibility::Private => "test-d-w-b-priv-i-service-name",
        };
        Self {
            service: service.to_string(),
            push_secret: format!("{}-docker-secret", service),
            pull_secret: (visibility == ImageVisibility::Private).then(|| format!("{}-p-docker-secret", service)),
            service_account: format!("{}-service-account", service),
        }
    }
}

fn allow_error<S: AsRef<str>>(driver: &ProcessDriver, args: &[S]) -> Result<(), CtlError> {
    driver.run_with_opts(args, &RunOpts::allow_error()).map(|_| ())
}

fn deploy_args(env: &E2eEnv, names: &ScenarioNames, image: &str, revision: &str, env_pair: String) -> Vec<String> {
    vec![
        "deploy".into(),
        "-s".into(),
        names.service.clone(),
        "--git-url".into(),
        env.build_git_url.clone(),
        "--git-revision".into(),
        revision.to_string(),
        "-i".into(),
        image.to_string(),
        "--service-account".into(),
        names.service_account.clone(),
        "-e".into(),
        env_pair,
    ]
}

/// Run the deploy-with-build scenario for one image visibility.
pub fn run_deploy_with_build(
    env: &E2eEnv,
    visibility: ImageVisibility,
    poll: PollConfig,
    logger: Logger,
) -> Result<ScenarioReport, CtlError> {
    let svcctl = ProcessDriver::new(env.binary.as_str(), logger.clone()).with_namespace(env.namespace.as_str());
    let kubectl = ProcessDriver::new(env.kubectl.as_str(), logger.clone()).with_namespace(env.namespace.as_str());
    let poller = Poller::new(poll, logger.clone());
    let names = ScenarioNames::new(visibility);
    let image = env.image(visibility);
    let credentials = RunOpts::redacted()
        .redact_value(env.docker_username.as_str())
        .redact_value(env.docker_password.as_str());

    let scenario_name = match visibility {
        ImageVisibility::Public => "deploy with build (public image)",
        ImageVisibility::Private => "deploy with build (private image)",
    };

    let mut scenario = Scenario::new(scenario_name, logger)
        .cleanup("delete service", || allow_error(&svcctl, &["delete", "service", "-s", names.service.as_str()]))
        .cleanup("delete push secret", || {
            allow_error(&svcctl, &["delete", "secret", "-s", names.push_secret.as_str()])
        });
    if let Some(pull_secret) = names.pull_secret.as_deref() {
        let kubectl = &kubectl;
        scenario = scenario.cleanup("delete pull secret", move || {
            allow_error(kubectl, &["delete", "secret", pull_secret])
        });
    }
    scenario = scenario.cleanup("delete service account", || {
        allow_error(&svcctl, &["delete", "service-account", "-a", names.service_account.as_str()])
    });

    scenario
        .step("Add service account with Docker push secret", || {
            svcctl.run_with_opts(
                &[
                    "create",
                    "basic-auth-secret",
                    "-s",
                    names.push_secret.as_str(),
                    "--docker-hub",
                    "-u",
                    env.docker_username.as_str(),
                    "-p",
                    env.docker_password.as_str(),
                ],
                &credentials,
            )?;

            let mut account_args = vec![
                "create".to_string(),
                "service-account".into(),
                "-a".into(),
                names.service_account.clone(),
                "-s".into(),
                names.push_secret.clone(),
            ];
            if let Some(ref pull_secret) = names.pull_secret {
                kubectl.run_with_opts(
                    &[
                        "create",
                        "secret",
                        "docker-registry",
                        pull_secret.as_str(),
                        "--docker-server",
                        DOCKER_REGISTRY_SERVER,
                        "--docker-username",
                        env.docker_username.as_str(),
                        "--docker-password",
                        env.docker_password.as_str(),
                        "--docker-email",
                        "foo",
                    ],
                    &credentials,
                )?;
                account_args.extend(["-p".to_string(), pull_secret.clone()]);
            }
            svcctl.run(&account_args)?;
            Ok(())
        })
        .step("Deploy service v1", || {
            let args = deploy_args(
                env,
                &names,
                image,
                &env.build_git_revision_v1,
                format!("SIMPLE_MSG={}", EXPECTED_CONTENT_V1),
            );
            svcctl.run(&args).map(|_| ())
        })
        .step("Checking if service is reachable and presents v1 content", || {
            let mut source = CliCurlSource::new(svcctl.clone(), names.service.as_str());
            poller
                .wait_for_content(&mut source, &Expectation::contains(EXPECTED_CONTENT_V1))
                .map(|_| ())
        })
        .step("Deploy service v2 with a Git change (new env variable)", || {
            let args = deploy_args(
                env,
                &names,
                image,
                &env.build_git_revision_v2,
                format!("SIMPLE_MSG_V2={}", EXPECTED_CONTENT_V2),
            );
            svcctl.run(&args).map(|_| ())
        })
        .step("Checking if service is reachable and presents v2 content", || {
            let mut source = CliCurlSource::new(svcctl.clone(), names.service.as_str());
            poller
                .wait_for_content(&mut source, &Expectation::contains(EXPECTED_CONTENT_V2))
                .map(|_| ())
        })
        .step("Deleting service", || {
            svcctl.run(&["delete", "service", "-s", names.service.as_str()])?;
            let out = svcctl.run(&["list", "services", "--json"])?;
            if out.contains(&names.service) {
                return Err(CtlError::mismatch(format!(
                    "expected service '{}' to be absent from the service list, but was: {}",
                    names.service, out
                )));
            }
            Ok(())
        })
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (NAMESPACE_ENV, "e2e"),
            (BINARY_ENV, "/usr/local/bin/svcctl"),
            ("SVCCTL_E2E_BUILD_GIT_URL", "https://github.com/example/simple-app"),
            ("SVCCTL_E2E_BUILD_GIT_REVISION_V1", "v1"),
            ("SVCCTL_E2E_BUILD_GIT_REVISION_V2", "v2"),
            ("SVCCTL_E2E_BUILD_PUBLIC_IMAGE", "docker.io/example/simple-app"),
            ("SVCCTL_E2E_BUILD_PRIVATE_IMAGE", "docker.io/example/simple-app-private"),
            ("SVCCTL_E2E_DOCKER_USERNAME", "builder"),
            ("SVCCTL_E2E_DOCKER_PASSWORD", "s3cr3t-pw"),
        ])
    }

    #[test]
    fn test_env_from_lookup() {
        let vars = full_env();
        let env = E2eEnv::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(env.kubectl, "kubectl");
        assert_eq!(env.image(ImageVisibility::Private), "docker.io/example/simple-app-private");
        assert!(!format!("{:?}", env).contains("s3cr3t-pw"));
    }

    #[test]
    fn test_env_reports_all_missing() {
        let mut vars = full_env();
        vars.remove(NAMESPACE_ENV);
        vars.remove("SVCCTL_E2E_DOCKER_PASSWORD");
        let err = E2eEnv::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.missing_flags, vec![NAMESPACE_ENV, "SVCCTL_E2E_DOCKER_PASSWORD"]);
    }

    #[test]
    fn test_scenario_names() {
        let public = ScenarioNames::new(ImageVisibility::Public);
        assert_eq!(public.push_secret, "test-d-w-b-pub-i-service-name-docker-secret");
        assert_eq!(public.pull_secret, None);
        let private = ScenarioNames::new(ImageVisibility::Private);
        assert_eq!(private.pull_secret.as_deref(), Some("test-d-w-b-priv-i-service-name-p-docker-secret"));
        assert_eq!(private.service_account, "test-d-w-b-priv-i-service-name-service-account");
    }

    #[cfg(unix)]
    mod fake_cluster {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Duration;

        /// A stand-in binary: `deploy` records the SIMPLE_MSG* value that
        /// `curl` then serves. Every invocation is appended to `calls`.
        fn write_fake_cli(dir: &Path, deploy_exit: i32) -> String {
            let path = dir.join("fake-svcctl");
            let script = format!(
                r#"#!/bin/sh
dir='{dir}'
echo "$*" >> "$dir/calls"
case "$1" in
  deploy)
    for arg in "$@"; do
      case "$arg" in
        SIMPLE_MSG=*) printf '%s' "${{arg#SIMPLE_MSG=}}" > "$dir/content" ;;
        SIMPLE_MSG_V2=*) printf '%s' "${{arg#SIMPLE_MSG_V2=}}" > "$dir/content" ;;
      esac
    done
    exit {deploy_exit} ;;
  curl) cat "$dir/content" 2>/dev/null || exit 1 ;;
  list) printf '{{"services":[]}}\n' ;;
esac
"#,
                dir = dir.display(),
                deploy_exit = deploy_exit,
            );
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        }

        fn env_for(binary: String) -> E2eEnv {
            let vars = full_env();
            let mut env = E2eEnv::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
            env.binary = binary;
            env.kubectl = "true".into();
            env
        }

        fn fast_poll() -> PollConfig {
            PollConfig { deadline: Duration::from_secs(5), interval: Duration::from_millis(10) }
        }

        #[test]
        fn test_public_scenario_against_fake_cli() {
            let dir = tempfile::tempdir().unwrap();
            let env = env_for(write_fake_cli(dir.path(), 0));
            let logger = Logger::new();

            let report = run_deploy_with_build(&env, ImageVisibility::Public, fast_poll(), logger.clone()).unwrap();
            assert_eq!(report.completed_steps.len(), 6);

            let calls = fs::read_to_string(dir.path().join("calls")).unwrap();
            let lines: Vec<&str> = calls.lines().collect();
            assert!(lines[0].starts_with("delete service -s test-d-w-b-pub-i-service-name"));
            assert!(calls.contains("SIMPLE_MSG_V2=TestDeployWithBuild_ContentV2"));
            assert!(lines.last().unwrap().starts_with("delete service -s "), "{}", calls);

            assert!(!logger.text().contains("s3cr3t-pw"));
            assert!(logger.contains("-redacted-"));
            assert!(logger.contains("Observed expected content"));
        }

        #[test]
        fn test_failed_deploy_still_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let env = env_for(write_fake_cli(dir.path(), 1));

            let err = run_deploy_with_build(&env, ImageVisibility::Private, fast_poll(), Logger::new()).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Subprocess);

            let calls = fs::read_to_string(dir.path().join("calls")).unwrap();
            assert!(!calls.lines().any(|l| l.starts_with("curl")), "{}", calls);
            assert_eq!(calls.matches("delete service-account").count(), 2, "{}", calls);
            assert!(calls.contains("-p test-d-w-b-priv-i-service-name-p-docker-secret"));
        }
    }
}
