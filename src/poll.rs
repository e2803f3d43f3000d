//! Convergence poller
//!
//! Repeatedly fetches content from a just-deployed endpoint until the
//! expected content shows up or the deadline passes. Returns at the first
//! match; never gives up before the deadline and never waits past it by more
//! than one fetch.

use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::error::{CtlError, ErrorKind};
use crate::log::Logger;
use crate::process::{ProcessDriver, RunOpts};

/// How long a deployed revision gets to become routable
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(300);
/// Wait between two fetch attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Per-request timeout of [`HttpSource`]
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub deadline: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_POLL_DEADLINE,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Defaults overridden by `SVCCTL_E2E_POLL_DEADLINE_SECS` and
    /// `SVCCTL_E2E_POLL_INTERVAL_MS`. A zero interval is rejected.
    pub fn from_env() -> Result<Self, CtlError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CtlError> {
        let mut config = Self::default();
        if let Some(secs) = parse_u64(&lookup, "SVCCTL_E2E_POLL_DEADLINE_SECS")? {
            config.deadline = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, "SVCCTL_E2E_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(CtlError::validation("SVCCTL_E2E_POLL_INTERVAL_MS must be greater than zero"));
            }
            config.interval = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, CtlError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CtlError::validation(format!("{} must be a non-negative integer, got '{}'", key, raw))),
        None => Ok(None),
    }
}

/// What counts as converged content
#[derive(Debug, Clone)]
pub enum Expectation {
    Contains(String),
    Pattern(Regex),
}

impl Expectation {
    pub fn contains(s: impl Into<String>) -> Self {
        Expectation::Contains(s.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, CtlError> {
        Regex::new(pattern)
            .map(Expectation::Pattern)
            .map_err(|e| CtlError::validation(format!("invalid pattern '{}': {}", pattern, e)))
    }

    pub fn matches(&self, content: &str) -> bool {
        match self {
            Expectation::Contains(s) => content.contains(s.as_str()),
            Expectation::Pattern(re) => re.is_match(content),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Expectation::Contains(s) => format!("content containing '{}'", s),
            Expectation::Pattern(re) => format!("content matching /{}/", re.as_str()),
        }
    }
}

/// Something that can be read repeatedly
pub trait ContentSource {
    fn describe(&self) -> String;
    fn fetch(&mut self) -> Result<String, CtlError>;
}

/// GET an URL, optionally with a `Host` header for ingress routing
pub struct HttpSource {
    url: String,
    host: Option<String>,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_FETCH_TIMEOUT))
            .build();
        Self {
            url: url.into(),
            host: None,
            agent: config.into(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl ContentSource for HttpSource {
    fn describe(&self) -> String {
        match self.host {
            Some(ref host) => format!("GET {} (Host: {})", self.url, host),
            None => format!("GET {}", self.url),
        }
    }

    fn fetch(&mut self) -> Result<String, CtlError> {
        http_get(&self.agent, &self.url, self.host.as_deref())
    }
}

/// Perform one GET and return the body; non-2xx statuses are errors.
pub fn http_get(agent: &ureq::Agent, url: &str, host: Option<&str>) -> Result<String, CtlError> {
    let mut request = agent.get(url);
    if let Some(host) = host {
        request = request.header("Host", host);
    }
    let mut response = request
        .call()
        .map_err(|e| CtlError::backend(format!("GET {}: {}", url, e)))?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| CtlError::backend(format!("GET {}: reading body: {}", url, e)))
}

/// Fetch through the CLI's own `curl -s <service>` subcommand
pub struct CliCurlSource {
    driver: ProcessDriver,
    service: String,
}

impl CliCurlSource {
    pub fn new(driver: ProcessDriver, service: impl Into<String>) -> Self {
        Self { driver, service: service.into() }
    }
}

impl ContentSource for CliCurlSource {
    fn describe(&self) -> String {
        format!("{} curl -s {}", self.driver.program(), self.service)
    }

    fn fetch(&mut self) -> Result<String, CtlError> {
        let out = self
            .driver
            .run_with_opts(&["curl", "-s", self.service.as_str()], &RunOpts::allow_error())?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(CtlError::backend(format!(
                "curl exited with {:?}: {}",
                out.exit_code,
                out.stderr.trim()
            )))
        }
    }
}

/// Where a poll currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Polling,
    Satisfied,
    TimedOut,
}

/// Progress of one poll: attempts made and time left
#[derive(Debug, Clone)]
pub struct PollState {
    started: Instant,
    deadline: Duration,
    attempts: u32,
    status: PollStatus,
}

impl PollState {
    pub fn start(deadline: Duration) -> Self {
        Self {
            started: Instant::now(),
            deadline,
            attempts: 0,
            status: PollStatus::Polling,
        }
    }

    /// Record one attempt. A match wins even if it arrived at the deadline.
    pub fn observe(&mut self, matched: bool) -> PollStatus {
        if self.status != PollStatus::Polling {
            return self.status;
        }
        self.attempts += 1;
        self.status = if matched {
            PollStatus::Satisfied
        } else if self.elapsed() >= self.deadline {
            PollStatus::TimedOut
        } else {
            PollStatus::Polling
        };
        self.status
    }

    pub fn status(&self) -> PollStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_sub(self.elapsed())
    }
}

/// Result of a satisfied poll
#[derive(Debug, Clone)]
pub struct PollReport {
    pub attempts: u32,
    pub elapsed: Duration,
    pub content: String,
}

pub struct Poller {
    config: PollConfig,
    logger: Logger,
}

impl Poller {
    pub fn new(config: PollConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Fetch until `expected` matches or the deadline passes.
    ///
    /// Fetch errors count as "not converged yet".
    pub fn wait_for_content(
        &self,
        source: &mut dyn ContentSource,
        expected: &Expectation,
    ) -> Result<PollReport, CtlError> {
        let target = source.describe();
        self.logger.logf(&format!("Waiting for {} from {}", expected.describe(), target));

        let mut state = PollState::start(self.config.deadline);
        let mut last_seen = String::new();
        loop {
            let matched = match source.fetch() {
                Ok(content) => {
                    let matched = expected.matches(&content);
                    last_seen = content;
                    matched
                }
                Err(e) => {
                    last_seen = format!("error: {}", e.message);
                    false
                }
            };

            match state.observe(matched) {
                PollStatus::Satisfied => {
                    tracing::info!(attempts = state.attempts(), elapsed_ms = state.elapsed().as_millis() as u64, "content converged");
                    self.logger.logf(&format!("Observed expected content after {} attempt(s)", state.attempts()));
                    return Ok(PollReport {
                        attempts: state.attempts(),
                        elapsed: state.elapsed(),
                        content: last_seen,
                    });
                }
                PollStatus::TimedOut => {
                    tracing::warn!(attempts = state.attempts(), target = %target, "content did not converge");
                    return Err(CtlError::new(
                        ErrorKind::ConvergenceTimeout,
                        format!(
                            "expected {} from {} within {:?} ({} attempts); last observed: {}",
                            expected.describe(),
                            target,
                            self.config.deadline,
                            state.attempts(),
                            last_seen.trim(),
                        ),
                    ));
                }
                PollStatus::Polling => {
                    tracing::debug!(attempt = state.attempts(), "content not converged yet");
                    thread::sleep(self.config.interval.min(state.remaining()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    /// Returns the queued responses in order, then repeats the last one
    struct Scripted {
        responses: Vec<Result<String, CtlError>>,
        calls: u32,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, CtlError>>) -> Self {
            Self { responses, calls: 0 }
        }
    }

    impl ContentSource for Scripted {
        fn describe(&self) -> String {
            "scripted".into()
        }

        fn fetch(&mut self) -> Result<String, CtlError> {
            self.calls += 1;
            let idx = (self.calls as usize - 1).min(self.responses.len() - 1);
            match &self.responses[idx] {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(CtlError::backend(e.message.clone())),
            }
        }
    }

    fn fast(deadline_ms: u64, interval_ms: u64) -> Poller {
        Poller::new(
            PollConfig {
                deadline: Duration::from_millis(deadline_ms),
                interval: Duration::from_millis(interval_ms),
            },
            Logger::new(),
        )
    }

    #[test]
    fn test_returns_at_first_success() {
        let mut source = Scripted::new(vec![
            Err(CtlError::backend("connection refused")),
            Ok("old".into()),
            Ok("Hello V1".into()),
            Ok("Hello V2".into()),
        ]);
        let report = fast(5_000, 5)
            .wait_for_content(&mut source, &Expectation::contains("V1"))
            .unwrap();
        assert_eq!(report.attempts, 3);
        assert_eq!(source.calls, 3);
        assert_eq!(report.content, "Hello V1");
    }

    #[test]
    fn test_times_out_at_not_before_deadline() {
        let mut source = Scripted::new(vec![Ok("never".into())]);
        let started = Instant::now();
        let err = fast(300, 40)
            .wait_for_content(&mut source, &Expectation::contains("V1"))
            .unwrap_err();
        let elapsed = started.elapsed();
        assert_eq!(err.kind, ErrorKind::ConvergenceTimeout);
        assert!(elapsed >= Duration::from_millis(300), "gave up early: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "hung: {:?}", elapsed);
        assert!(source.calls >= 2);
        assert!(err.message.contains("last observed: never"));
    }

    #[test]
    fn test_interval_longer_than_deadline_still_times_out_on_time() {
        let mut source = Scripted::new(vec![Ok("x".into())]);
        let started = Instant::now();
        let err = fast(100, 60_000)
            .wait_for_content(&mut source, &Expectation::contains("y"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConvergenceTimeout);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(source.calls, 2);
    }

    #[test]
    fn test_poll_state_transitions() {
        let mut state = PollState::start(Duration::from_secs(60));
        assert_eq!(state.observe(false), PollStatus::Polling);
        assert_eq!(state.observe(true), PollStatus::Satisfied);
        assert_eq!(state.observe(false), PollStatus::Satisfied);
        assert_eq!(state.attempts(), 2);

        let mut state = PollState::start(Duration::ZERO);
        assert_eq!(state.observe(false), PollStatus::TimedOut);
        assert_eq!(state.status(), PollStatus::TimedOut);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = PollConfig::from_lookup(|key| match key {
            "SVCCTL_E2E_POLL_DEADLINE_SECS" => Some("30".into()),
            "SVCCTL_E2E_POLL_INTERVAL_MS" => Some(" 250 ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config, PollConfig { deadline: Duration::from_secs(30), interval: Duration::from_millis(250) });
        assert_eq!(Poller::new(config, Logger::new()).config(), config);
        assert_eq!(PollConfig::from_lookup(|_| None).unwrap(), PollConfig::default());
    }

    #[test]
    fn test_config_rejects_zero_interval_and_garbage() {
        let err = PollConfig::from_lookup(|key| (key == "SVCCTL_E2E_POLL_INTERVAL_MS").then(|| "0".to_string()))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("greater than zero"));

        let err = PollConfig::from_lookup(|key| (key == "SVCCTL_E2E_POLL_DEADLINE_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.message.contains("got 'soon'"));
    }

    #[test]
    fn test_pattern_expectation() {
        let exp = Expectation::pattern(r"Content_V\d").unwrap();
        assert!(exp.matches("TestDeploy_Content_V2"));
        assert!(!exp.matches("TestDeploy"));
        assert!(Expectation::pattern("(").is_err());
    }

    #[test]
    fn test_http_source_sends_host_header() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut host = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if line.to_ascii_lowercase().starts_with("host:") {
                    host = line[5..].trim().to_string();
                }
            }
            let body = format!("host={}", host);
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
        });

        let mut source = HttpSource::new(format!("http://{}/", addr)).with_host("web.prod.example.com");
        let report = fast(5_000, 10)
            .wait_for_content(&mut source, &Expectation::contains("host=web.prod.example.com"))
            .unwrap();
        assert_eq!(report.attempts, 1);
        server.join().unwrap();
    }
}
