//! Command, harness and scenario errors

use std::fmt;

/// The kind of error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Required flags missing or a flag value failed its constraint
    Validation,
    /// The argument vector could not be tokenized (unknown flag, missing value)
    Usage,
    /// An external process exited non-zero
    Subprocess,
    /// Expected content was never observed before the deadline
    ConvergenceTimeout,
    /// Harness assertion: expected and actual values differ
    AssertionMismatch,
    /// The addressed resource does not exist
    NotFound,
    /// The backend refused or failed the operation
    Backend,
    /// IO error
    Io,
}

/// Output captured from a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// An error with optional command context
#[derive(Debug)]
pub struct CtlError {
    pub kind: ErrorKind,
    pub message: String,
    /// Command (or redacted command line) the error belongs to
    pub command: Option<String>,
    /// Long names of required flags that were not supplied, in declaration order
    pub missing_flags: Vec<String>,
    /// Subprocess output, for diagnosing `Subprocess` errors
    pub output: Option<CapturedOutput>,
}

impl CtlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            command: None,
            missing_flags: Vec::new(),
            output: None,
        }
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    pub fn with_missing_flags(mut self, flags: Vec<String>) -> Self {
        self.missing_flags = flags;
        self
    }

    pub fn with_output(mut self, output: CapturedOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Usage, msg)
    }

    pub fn not_found(what: &str, name: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("{} '{}' not found", what, name))
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, msg)
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionMismatch, msg)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Convert a handler error, keeping the kind of a `CtlError` found in the chain.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        match err.downcast::<CtlError>() {
            Ok(inner) => inner,
            Err(_) => Self::backend(message),
        }
    }
}

impl fmt::Display for CtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref cmd) = self.command {
            write!(f, "{}: ", cmd)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref output) = self.output {
            if let Some(code) = output.exit_code {
                write!(f, " (exit code {})", code)?;
            }
            if !output.stdout.trim().is_empty() {
                write!(f, "\n[stdout]\n{}", output.stdout.trim_end())?;
            }
            if !output.stderr.trim().is_empty() {
                write!(f, "\n[stderr]\n{}", output.stderr.trim_end())?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CtlError {}

impl From<std::io::Error> for CtlError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_command_and_output() {
        let err = CtlError::new(ErrorKind::Subprocess, "process exited unsuccessfully")
            .with_command("svcctl delete service -s web")
            .with_output(CapturedOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "Error: service 'web' not found\n".into(),
            });
        let text = err.to_string();
        assert!(text.starts_with("svcctl delete service -s web: process exited unsuccessfully (exit code 1)"));
        assert!(text.contains("[stderr]\nError: service 'web' not found"));
        assert!(!text.contains("[stdout]"));
    }

    #[test]
    fn test_from_anyhow_keeps_ctl_error_kind() {
        let err = anyhow::Error::new(CtlError::not_found("service", "web"));
        let converted = CtlError::from_anyhow(err);
        assert!(converted.is_not_found());

        let converted = CtlError::from_anyhow(anyhow::anyhow!("connection refused"));
        assert_eq!(converted.kind, ErrorKind::Backend);
        assert_eq!(converted.message, "connection refused");
    }
}
