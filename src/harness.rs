//! Command test harness
//!
//! Drives a [`Command`] through argument parsing without ever invoking its
//! handler, so commands whose handlers talk to a real backend can be tested
//! for flag binding and validation alone.
//!
//! ```rust,ignore
//! let mut cmd = TestCmd::new(new_create_service_account_cmd(Rc::new(NoopDepsFactory)));
//! cmd.execute(&["-n", "ns", "-a", "builder", "-s", "one", "-s", "two"]);
//! cmd.expect_reaches_execution();
//! assert_deep_eq(&cmd.options().create_flags.secrets, &vec!["one".into(), "two".into()]);
//! ```

use std::collections::BTreeSet;
use std::fmt::Debug;

use similar::TextDiff;

use crate::command::Command;
use crate::deps::DepsFactory;
use crate::error::{CtlError, ErrorKind};
use crate::flags::{self, Options};

pub struct TestCmd<O, D> {
    cmd: Command<O, D>,
    reached: bool,
    error: Option<CtlError>,
}

impl<O: Options, D: DepsFactory> TestCmd<O, D> {
    pub fn new(cmd: Command<O, D>) -> Self {
        Self { cmd, reached: false, error: None }
    }

    /// Parse and validate `args`; records whether execution would be reached.
    pub fn execute(&mut self, args: &[&str]) {
        self.reached = false;
        self.error = None;
        match self.cmd.parse(args) {
            Ok(()) => self.reached = true,
            Err(e) => {
                tracing::debug!(command = self.cmd.name(), error = %e, "harness parse failed");
                self.error = Some(e);
            }
        }
    }

    pub fn command(&self) -> &Command<O, D> {
        &self.cmd
    }

    pub fn options(&self) -> &O {
        self.cmd.options()
    }

    pub fn reached_execution(&self) -> bool {
        self.reached
    }

    pub fn error(&self) -> Option<&CtlError> {
        self.error.as_ref()
    }

    /// Name, summary and unique flag names
    pub fn check_basic_config(&self) -> Result<(), CtlError> {
        let mut problems = Vec::new();
        if self.cmd.name().trim().is_empty() {
            problems.push("command has no name".to_string());
        }
        if self.cmd.about().trim().is_empty() {
            problems.push("command has no summary".to_string());
        }
        for spec in self.cmd.flag_specs() {
            if spec.help.trim().is_empty() {
                problems.push(format!("flag --{} has no help text", spec.long));
            }
        }
        let dups = flags::duplicate_names(self.cmd.flag_specs());
        if !dups.is_empty() {
            problems.push(format!("duplicate flags: {}", dups.join(", ")));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CtlError::mismatch(problems.join("; ")).with_command(self.cmd.name()))
        }
    }

    pub fn check_reaches_execution(&self) -> Result<(), CtlError> {
        match self.error {
            None if self.reached => Ok(()),
            None => Err(CtlError::mismatch("command was never executed").with_command(self.cmd.name())),
            Some(ref e) => Err(CtlError::mismatch(format!("expected to reach execution, but failed: {}", e))
                .with_command(self.cmd.name())),
        }
    }

    pub fn check_not_reaches_execution(&self) -> Result<(), CtlError> {
        if self.reached {
            Err(CtlError::mismatch("expected not to reach execution").with_command(self.cmd.name()))
        } else {
            Ok(())
        }
    }

    /// The reported missing flags must equal `expected` as a set.
    pub fn check_required_flags(&self, expected: &[&str]) -> Result<(), CtlError> {
        self.check_not_reaches_execution()?;
        let actual: BTreeSet<&str> = match self.error {
            Some(ref e) if e.kind == ErrorKind::Validation => e.missing_flags.iter().map(String::as_str).collect(),
            Some(ref e) => {
                return Err(CtlError::mismatch(format!("expected a validation error, got: {}", e))
                    .with_command(self.cmd.name()))
            }
            None => BTreeSet::new(),
        };
        let expected: BTreeSet<&str> = expected.iter().copied().collect();
        if actual == expected {
            return Ok(());
        }

        let not_reported: Vec<&str> = expected.difference(&actual).copied().collect();
        let unexpected: Vec<&str> = actual.difference(&expected).copied().collect();
        Err(CtlError::mismatch(format!(
            "required flags differ: expected but not reported {:?}; reported but not expected {:?}",
            not_reported, unexpected
        ))
        .with_command(self.cmd.name()))
    }

    pub fn check_options(&self, expected: &O) -> Result<(), CtlError>
    where
        O: PartialEq,
    {
        check_deep_eq(expected, self.cmd.options())
    }

    #[track_caller]
    pub fn expect_basic_config(&self) {
        expect(self.check_basic_config());
    }

    #[track_caller]
    pub fn expect_reaches_execution(&self) {
        expect(self.check_reaches_execution());
    }

    #[track_caller]
    pub fn expect_not_reaches_execution(&self) {
        expect(self.check_not_reaches_execution());
    }

    #[track_caller]
    pub fn expect_required_flags(&self, expected: &[&str]) {
        expect(self.check_required_flags(expected));
    }

    #[track_caller]
    pub fn expect_options(&self, expected: &O)
    where
        O: PartialEq,
    {
        expect(self.check_options(expected));
    }
}

/// Structural equality with a unified diff of the pretty `Debug` forms on mismatch.
pub fn check_deep_eq<T: Debug + PartialEq + ?Sized>(expected: &T, actual: &T) -> Result<(), CtlError> {
    if expected == actual {
        return Ok(());
    }
    let expected_text = format!("{:#?}\n", expected);
    let actual_text = format!("{:#?}\n", actual);
    let diff = TextDiff::from_lines(&expected_text, &actual_text)
        .unified_diff()
        .header("expected", "actual")
        .to_string();
    Err(CtlError::mismatch(format!("values differ:\n{}", diff)))
}

#[track_caller]
pub fn assert_deep_eq<T: Debug + PartialEq + ?Sized>(expected: &T, actual: &T) {
    expect(check_deep_eq(expected, actual));
}

#[track_caller]
fn expect(result: Result<(), CtlError>) {
    if let Err(e) = result {
        panic!("{}", e);
    }
}
