//! Scenario orchestrator
//!
//! A scenario is an ordered list of steps plus cleanup actions. Cleanup runs
//! once up front to erase leftovers of an earlier failed run, and once more
//! at the end on every exit path, panics included.

use std::time::{Duration, Instant};

use crate::error::CtlError;
use crate::log::Logger;

type StepFn<'a> = Box<dyn FnOnce() -> Result<(), CtlError> + 'a>;
type CleanupFn<'a> = Box<dyn FnMut() -> Result<(), CtlError> + 'a>;

/// Phase a scenario is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    Setup,
    Running,
    Teardown,
}

/// Result of a completed scenario
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    /// Steps that finished successfully, in order
    pub completed_steps: Vec<String>,
    /// Cleanup failures tolerated during setup
    pub setup_errors: Vec<String>,
    pub duration: Duration,
}

impl ScenarioReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} step(s) passed ({}ms)",
            self.name,
            self.completed_steps.len(),
            self.duration.as_millis()
        )
    }
}

pub struct Scenario<'a> {
    name: String,
    logger: Logger,
    steps: Vec<(String, StepFn<'a>)>,
    cleanups: Vec<(String, CleanupFn<'a>)>,
    pre_cleanup: bool,
}

impl<'a> Scenario<'a> {
    pub fn new(name: impl Into<String>, logger: Logger) -> Self {
        Self {
            name: name.into(),
            logger,
            steps: Vec::new(),
            cleanups: Vec::new(),
            pre_cleanup: true,
        }
    }

    /// Register a cleanup action. It must tolerate the resource being absent.
    pub fn cleanup(mut self, name: impl Into<String>, action: impl FnMut() -> Result<(), CtlError> + 'a) -> Self {
        self.cleanups.push((name.into(), Box::new(action)));
        self
    }

    pub fn step(mut self, name: impl Into<String>, action: impl FnOnce() -> Result<(), CtlError> + 'a) -> Self {
        self.steps.push((name.into(), Box::new(action)));
        self
    }

    /// Do not run cleanup before the steps
    pub fn without_pre_cleanup(mut self) -> Self {
        self.pre_cleanup = false;
        self
    }

    /// Run setup, steps and teardown.
    ///
    /// The first failing step aborts the remaining steps; its error is
    /// returned after teardown. A teardown error is returned only when every
    /// step passed.
    pub fn run(self) -> Result<ScenarioReport, CtlError> {
        let start = Instant::now();
        let Scenario { name, logger, steps, mut cleanups, pre_cleanup } = self;
        tracing::info!(scenario = %name, steps = steps.len(), "scenario started");

        let mut setup_errors = Vec::new();
        if pre_cleanup && !cleanups.is_empty() {
            log_phase(&logger, &name, ScenarioPhase::Setup);
            for (cleanup_name, action) in cleanups.iter_mut() {
                if let Err(e) = action() {
                    logger.logf(&format!("[setup cleanup '{}' failed: {}]", cleanup_name, e.message));
                    setup_errors.push(format!("{}: {}", cleanup_name, e.message));
                }
            }
        }

        let mut teardown = Teardown::new(&mut cleanups, &logger, &name);

        log_phase(&logger, &name, ScenarioPhase::Running);
        let mut completed_steps = Vec::new();
        let mut failure = None;
        for (step_name, action) in steps {
            match logger.section(&step_name, action) {
                Ok(()) => completed_steps.push(step_name),
                Err(e) => {
                    logger.logf(&format!("[step '{}' failed: {}]", step_name, e.message));
                    tracing::warn!(scenario = %name, step = %step_name, kind = ?e.kind, "scenario step failed");
                    failure = Some(e);
                    break;
                }
            }
        }

        let teardown_errors = teardown.run();
        drop(teardown);
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(e) = teardown_errors.into_iter().next() {
            return Err(e);
        }

        let report = ScenarioReport {
            name,
            completed_steps,
            setup_errors,
            duration: start.elapsed(),
        };
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    /// Run and panic on failure, for use inside `#[test]` functions.
    pub fn run_and_assert(self) -> ScenarioReport {
        let logger = self.logger.clone();
        let name = self.name.clone();
        match self.run() {
            Ok(report) => report,
            Err(e) => {
                eprintln!("--- log ---");
                for line in logger.lines() {
                    eprintln!("  {}", line);
                }
                panic!("scenario '{}' failed: {}", name, e);
            }
        }
    }
}

fn log_phase(logger: &Logger, scenario: &str, phase: ScenarioPhase) {
    tracing::debug!(scenario = %scenario, phase = ?phase, "scenario phase");
    if phase != ScenarioPhase::Running {
        logger.logf(&format!("# {} ({:?})", scenario, phase));
    }
}

/// Runs every cleanup exactly once, in reverse registration order, either
/// explicitly or when dropped during unwinding.
struct Teardown<'s, 'a> {
    cleanups: &'s mut Vec<(String, CleanupFn<'a>)>,
    logger: &'s Logger,
    scenario: &'s str,
    done: bool,
}

impl<'s, 'a> Teardown<'s, 'a> {
    fn new(cleanups: &'s mut Vec<(String, CleanupFn<'a>)>, logger: &'s Logger, scenario: &'s str) -> Self {
        Self { cleanups, logger, scenario, done: false }
    }

    fn run(&mut self) -> Vec<CtlError> {
        if self.done {
            return Vec::new();
        }
        self.done = true;
        if self.cleanups.is_empty() {
            return Vec::new();
        }
        log_phase(self.logger, self.scenario, ScenarioPhase::Teardown);
        let mut errors = Vec::new();
        for (name, action) in self.cleanups.iter_mut().rev() {
            if let Err(e) = action() {
                self.logger.logf(&format!("[cleanup '{}' failed: {}]", name, e.message));
                errors.push(e);
            }
        }
        errors
    }
}

impl Drop for Teardown<'_, '_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::RefCell;

    fn counter_cleanup<'a>(log: &'a RefCell<Vec<String>>, tag: &'a str) -> impl FnMut() -> Result<(), CtlError> + 'a {
        move || {
            log.borrow_mut().push(format!("cleanup:{}", tag));
            Ok(())
        }
    }

    #[test]
    fn test_steps_run_in_order_between_cleanups() {
        let events = RefCell::new(Vec::new());
        let report = Scenario::new("ordered", Logger::new())
            .cleanup("a", counter_cleanup(&events, "a"))
            .cleanup("b", counter_cleanup(&events, "b"))
            .step("one", || {
                events.borrow_mut().push("step:one".into());
                Ok(())
            })
            .step("two", || {
                events.borrow_mut().push("step:two".into());
                Ok(())
            })
            .run()
            .unwrap();

        assert_eq!(report.completed_steps, vec!["one", "two"]);
        assert_eq!(
            *events.borrow(),
            vec!["cleanup:a", "cleanup:b", "step:one", "step:two", "cleanup:b", "cleanup:a"]
        );
    }

    #[test]
    fn test_failed_step_aborts_but_teardown_runs_once() {
        let events = RefCell::new(Vec::new());
        let err = Scenario::new("failing", Logger::new())
            .cleanup("a", counter_cleanup(&events, "a"))
            .step("boom", || Err(CtlError::new(ErrorKind::Subprocess, "exit 1")))
            .step("never", || {
                events.borrow_mut().push("step:never".into());
                Ok(())
            })
            .run()
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Subprocess);
        assert_eq!(*events.borrow(), vec!["cleanup:a", "cleanup:a"]);
    }

    #[test]
    fn test_teardown_runs_when_step_panics() {
        let events = RefCell::new(Vec::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Scenario::new("panicking", Logger::new())
                .without_pre_cleanup()
                .cleanup("a", counter_cleanup(&events, "a"))
                .step("assert", || panic!("assertion failed"))
                .run()
        }));
        assert!(result.is_err());
        assert_eq!(*events.borrow(), vec!["cleanup:a"]);
    }

    #[test]
    fn test_setup_cleanup_errors_are_tolerated() {
        let calls = RefCell::new(0);
        let report = Scenario::new("tolerant", Logger::new())
            .cleanup("flaky", || {
                *calls.borrow_mut() += 1;
                if *calls.borrow() == 1 {
                    Err(CtlError::not_found("service", "web"))
                } else {
                    Ok(())
                }
            })
            .step("noop", || Ok(()))
            .run()
            .unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(report.setup_errors, vec!["flaky: service 'web' not found"]);
    }

    #[test]
    fn test_teardown_error_surfaces_when_steps_pass() {
        let logger = Logger::new();
        let err = Scenario::new("teardown", logger.clone())
            .without_pre_cleanup()
            .cleanup("broken", || Err(CtlError::backend("store unavailable")))
            .step("ok", || Ok(()))
            .run()
            .unwrap_err();
        assert_eq!(err.message, "store unavailable");
        assert!(logger.contains("[cleanup 'broken' failed: store unavailable]"));
    }
}
