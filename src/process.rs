//! External process driver
//!
//! Runs the CLI under test (or an adjacent cluster CLI) as a subprocess and
//! captures its output. A non-zero exit is an error unless the invocation
//! allows it. Redaction only changes what is logged; the subprocess always
//! receives the real arguments.

use std::io::{self, Write};
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;

use crate::error::{CapturedOutput, CtlError, ErrorKind};
use crate::log::Logger;

/// Placeholder logged in place of sensitive arguments
pub const REDACTED: &str = "-redacted-";

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    /// Return the output of a non-zero exit instead of failing
    pub allow_error: bool,
    /// Log the command line as `<program> -redacted-` and suppress its output
    pub redact: bool,
    /// Individual values replaced with [`REDACTED`] wherever they would be logged
    pub redact_values: Vec<String>,
    /// Data written to the subprocess's stdin
    pub stdin: Option<String>,
}

impl RunOpts {
    pub fn allow_error() -> Self {
        Self { allow_error: true, ..Self::default() }
    }

    pub fn redacted() -> Self {
        Self { redact: true, ..Self::default() }
    }

    pub fn redact_value(mut self, value: impl Into<String>) -> Self {
        self.redact_values.push(value.into());
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    fn scrub(&self, text: &str) -> String {
        let mut text = text.to_string();
        for value in self.redact_values.iter().filter(|v| !v.is_empty()) {
            text = text.replace(value.as_str(), REDACTED);
        }
        text
    }
}

/// Output of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Drives one external program
#[derive(Debug, Clone)]
pub struct ProcessDriver {
    program: String,
    trailing_args: Vec<String>,
    envs: Vec<(String, String)>,
    logger: Logger,
}

impl ProcessDriver {
    pub fn new(program: impl Into<String>, logger: Logger) -> Self {
        Self { program: program.into(), trailing_args: Vec::new(), envs: Vec::new(), logger }
    }

    /// Append `-n <namespace>` to every invocation.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.trailing_args = vec!["-n".to_string(), namespace.into()];
        self
    }

    /// Set an environment variable for every invocation.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Run and return stdout; any non-zero exit is an error.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, CtlError> {
        self.run_with_opts(args, &RunOpts::default()).map(|out| out.stdout)
    }

    pub fn run_with_opts<S: AsRef<str>>(&self, args: &[S], opts: &RunOpts) -> Result<RunOutput, CtlError> {
        let full_args: Vec<String> = args
            .iter()
            .map(|a| a.as_ref().to_string())
            .chain(self.trailing_args.iter().cloned())
            .collect();
        let desc = self.describe(&full_args, opts);
        self.logger.logf(&format!("Running '{}'", desc));

        let mut cmd = ProcessCommand::new(&self.program);
        cmd.args(&full_args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if opts.stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|e| {
            CtlError::new(ErrorKind::Io, format!("failed to execute '{}': {}", self.program, e))
                .with_command(desc.clone())
        })?;

        // The child is reaped even if it exits without reading all of stdin.
        let feeder = match (opts.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(thread::spawn(move || stdin.write_all(input.as_bytes()))),
            _ => None,
        };

        let output = child.wait_with_output()?;
        if let Some(feeder) = feeder {
            match feeder.join() {
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::debug!(program = %self.program, "child closed stdin before reading all input");
                }
                Ok(Err(e)) => {
                    return Err(CtlError::new(ErrorKind::Io, format!("writing stdin: {}", e)).with_command(desc));
                }
                Ok(Ok(())) => {}
                Err(_) => {
                    return Err(CtlError::new(ErrorKind::Io, "stdin writer panicked").with_command(desc));
                }
            }
        }
        let result = RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };

        tracing::debug!(
            program = %self.program,
            exit_code = ?result.exit_code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "process finished"
        );

        if !opts.redact {
            if !result.stdout.is_empty() {
                self.logger.logf(&format!("[stdout]\n{}", opts.scrub(&result.stdout)));
            }
            if !result.stderr.is_empty() {
                self.logger.logf(&format!("[stderr]\n{}", opts.scrub(&result.stderr)));
            }
        }

        if result.success() {
            return Ok(result);
        }

        let status = match result.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        if opts.allow_error {
            self.logger.logf(&format!("[allowed failure: {}]", status));
            return Ok(result);
        }

        let captured = CapturedOutput {
            exit_code: result.exit_code,
            stdout: opts.scrub(&result.stdout),
            stderr: opts.scrub(&result.stderr),
        };
        Err(CtlError::new(ErrorKind::Subprocess, format!("process failed with {}", status))
            .with_command(desc)
            .with_output(captured))
    }

    /// The command line as it may be logged
    pub fn describe<S: AsRef<str>>(&self, args: &[S], opts: &RunOpts) -> String {
        if opts.redact {
            return format!("{} {}", self.program, REDACTED);
        }
        let mut parts = vec![self.program.clone()];
        parts.extend(args.iter().map(|a| {
            let a = a.as_ref();
            if opts.redact_values.iter().any(|v| !v.is_empty() && a.contains(v.as_str())) {
                opts.scrub(a)
            } else if a.contains(' ') || a.is_empty() {
                format!("'{}'", a)
            } else {
                a.to_string()
            }
        }));
        parts.join(" ")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(logger: &Logger) -> ProcessDriver {
        ProcessDriver::new("sh", logger.clone())
    }

    #[test]
    fn test_run_captures_stdout() {
        let logger = Logger::new();
        let out = sh(&logger).run(&["-c", "echo hello"]).unwrap();
        assert_eq!(out, "hello\n");
        assert!(logger.contains("Running 'sh -c 'echo hello''"));
        assert!(logger.contains("hello"));
    }

    #[test]
    fn test_nonzero_exit_is_fatal_with_output() {
        let logger = Logger::new();
        let err = sh(&logger).run(&["-c", "echo partial; echo boom >&2; exit 3"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Subprocess);
        let output = err.output.as_ref().unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "partial\n");
        assert_eq!(output.stderr, "boom\n");
    }

    #[test]
    fn test_allow_error_returns_output() {
        let logger = Logger::new();
        let out = sh(&logger)
            .run_with_opts(&["-c", "echo not found; exit 1"], &RunOpts::allow_error())
            .unwrap();
        assert_eq!(out.exit_code, Some(1));
        assert!(!out.success());
        assert_eq!(out.stdout, "not found\n");
        assert!(logger.contains("[allowed failure: exit code 1]"));
    }

    #[test]
    fn test_redact_hides_args_but_subprocess_sees_them() {
        let logger = Logger::new();
        let secret = "hunter2-s3cr3t";
        let out = sh(&logger)
            .run_with_opts(&["-c", "printf '%s' \"$1\"", "sh", secret], &RunOpts::redacted())
            .unwrap();
        assert_eq!(out.stdout, secret);
        assert!(!logger.text().contains(secret));
        assert!(logger.contains("Running 'sh -redacted-'"));
    }

    #[test]
    fn test_redact_values_in_logs_and_errors() {
        let logger = Logger::new();
        let secret = "p4ssw0rd";
        let opts = RunOpts::default().redact_value(secret);
        let err = sh(&logger)
            .run_with_opts(&["-c", "echo \"$1\"; exit 4", "sh", secret], &opts)
            .unwrap_err();
        assert!(!logger.text().contains(secret));
        assert!(logger.contains(REDACTED));
        assert!(!err.to_string().contains(secret));
        assert_eq!(err.output.unwrap().stdout, format!("{}\n", REDACTED));
    }

    #[test]
    fn test_namespace_is_appended() {
        let logger = Logger::new();
        let driver = sh(&logger).with_namespace("team-a");
        let out = driver.run(&["-c", "echo \"$0 $1 $2\"", "x"]).unwrap();
        assert_eq!(out, "x -n team-a\n");
    }

    #[test]
    fn test_env_is_set_for_child() {
        let logger = Logger::new();
        let out = sh(&logger).with_env("SVCCTL_STATE", "/tmp/x.json").run(&["-c", "echo $SVCCTL_STATE"]).unwrap();
        assert_eq!(out, "/tmp/x.json\n");
    }

    #[test]
    fn test_unread_stdin_does_not_lose_the_exit_status() {
        let logger = Logger::new();
        let input = "x".repeat(4 * 1024 * 1024);
        let out = sh(&logger)
            .run_with_opts(&["-c", "echo done; exit 0"], &RunOpts::default().with_stdin(input.clone()))
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "done\n");

        let out = sh(&logger)
            .run_with_opts(&["-c", "exit 5"], &RunOpts::allow_error().with_stdin(input))
            .unwrap();
        assert_eq!(out.exit_code, Some(5));
    }

    #[test]
    fn test_clones_log_to_the_shared_logger() {
        let logger = Logger::new();
        let driver = sh(&logger).with_namespace("ns");
        driver.clone().run(&["-c", "true"]).unwrap();
        assert!(driver.logger().contains("Running 'sh -c true -n ns'"));
        assert_eq!(driver.logger().lines(), logger.lines());
    }

    #[test]
    fn test_stdin_is_forwarded() {
        let logger = Logger::new();
        let out = sh(&logger)
            .run_with_opts(&["-c", "cat"], &RunOpts::default().with_stdin("piped"))
            .unwrap();
        assert_eq!(out.stdout, "piped");
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let logger = Logger::new();
        let err = ProcessDriver::new("/nonexistent/svcctl-test-binary", logger)
            .run(&["x"])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
