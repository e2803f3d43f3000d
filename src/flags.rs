//! Flag schema
//!
//! A [`FlagSpec`] describes one bindable input of a command. Option structs
//! implement [`Options`] to publish their specs and to bind resolved values
//! from [`ParsedFlags`]. Validation is collected, never short-circuited: every
//! missing required flag and every rejected value ends up in one error.

use std::collections::BTreeMap;
use std::fmt;

use clap::{Arg, ArgAction, ArgMatches};

use crate::error::CtlError;

/// Checks a single flag value; returns a human-readable reason on rejection.
pub type ValueCheck = fn(&str) -> Result<(), String>;

/// How many times a flag may appear and what it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// `--flag VALUE`, at most once
    Single,
    /// `--flag A --flag B`, accumulated in command-line order
    Repeated,
    /// `--flag`, boolean presence
    Switch,
}

/// One bindable command input
#[derive(Clone)]
pub struct FlagSpec {
    pub long: &'static str,
    pub short: Option<char>,
    pub required: bool,
    pub multiplicity: Multiplicity,
    pub default: Option<&'static str>,
    pub validator: Option<ValueCheck>,
    pub help: &'static str,
}

impl FlagSpec {
    fn new(long: &'static str, multiplicity: Multiplicity, help: &'static str) -> Self {
        Self {
            long,
            short: None,
            required: false,
            multiplicity,
            default: None,
            validator: None,
            help,
        }
    }

    pub fn single(long: &'static str, help: &'static str) -> Self {
        Self::new(long, Multiplicity::Single, help)
    }

    pub fn repeated(long: &'static str, help: &'static str) -> Self {
        Self::new(long, Multiplicity::Repeated, help)
    }

    pub fn switch(long: &'static str, help: &'static str) -> Self {
        Self::new(long, Multiplicity::Switch, help)
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub fn validate(mut self, check: ValueCheck) -> Self {
        self.validator = Some(check);
        self
    }

    /// Build the clap argument for this spec.
    ///
    /// Required-ness is not delegated to clap: clap stops at the first
    /// tokenizer error, while missing flags must be reported together.
    pub fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.long).long(self.long).help(self.help);
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        if self.required {
            arg = arg.long_help(format!("{} (required)", self.help));
        }
        match self.multiplicity {
            // Values may start with '-' (passwords); a repeated single flag keeps the last value.
            Multiplicity::Single => arg
                .action(ArgAction::Set)
                .num_args(1)
                .allow_hyphen_values(true)
                .overrides_with(self.long),
            Multiplicity::Repeated => arg.action(ArgAction::Append).num_args(1).allow_hyphen_values(true),
            Multiplicity::Switch => arg.action(ArgAction::SetTrue),
        }
    }
}

impl fmt::Debug for FlagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagSpec")
            .field("long", &self.long)
            .field("short", &self.short)
            .field("required", &self.required)
            .field("multiplicity", &self.multiplicity)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// A resolved flag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Single(String),
    Repeated(Vec<String>),
    Switch(bool),
}

/// Flag values resolved from one argument vector, keyed by long name.
///
/// Only flags that were supplied (or have a default) are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFlags {
    values: BTreeMap<&'static str, FlagValue>,
}

impl ParsedFlags {
    /// Resolve every spec against clap's matches, applying defaults.
    pub fn from_matches(specs: &[FlagSpec], matches: &ArgMatches) -> Self {
        let mut values = BTreeMap::new();
        for spec in specs {
            let value = match spec.multiplicity {
                Multiplicity::Single => matches
                    .get_one::<String>(spec.long)
                    .cloned()
                    .or_else(|| spec.default.map(str::to_string))
                    .map(FlagValue::Single),
                Multiplicity::Repeated => matches
                    .get_many::<String>(spec.long)
                    .map(|vals| FlagValue::Repeated(vals.cloned().collect())),
                Multiplicity::Switch => {
                    matches.get_flag(spec.long).then_some(FlagValue::Switch(true))
                }
            };
            if let Some(value) = value {
                values.insert(spec.long, value);
            }
        }
        Self { values }
    }

    /// Insert a value directly, bypassing clap.
    pub fn insert(&mut self, long: &'static str, value: FlagValue) {
        self.values.insert(long, value);
    }

    pub fn is_present(&self, long: &str) -> bool {
        self.values.contains_key(long)
    }

    pub fn single(&self, long: &str) -> Option<&str> {
        match self.values.get(long) {
            Some(FlagValue::Single(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Single value, or the empty string when absent
    pub fn string(&self, long: &str) -> String {
        self.single(long).unwrap_or_default().to_string()
    }

    /// Repeated values in command-line order
    pub fn repeated(&self, long: &str) -> Vec<String> {
        match self.values.get(long) {
            Some(FlagValue::Repeated(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn switch(&self, long: &str) -> bool {
        matches!(self.values.get(long), Some(FlagValue::Switch(true)))
    }

    fn raw_values(&self, long: &str) -> Vec<&str> {
        match self.values.get(long) {
            Some(FlagValue::Single(v)) => vec![v.as_str()],
            Some(FlagValue::Repeated(vs)) => vs.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Check required flags and value constraints.
///
/// Missing flags are listed in spec declaration order, each exactly once.
pub fn validate(specs: &[FlagSpec], parsed: &ParsedFlags) -> Result<(), CtlError> {
    let missing: Vec<String> = specs
        .iter()
        .filter(|spec| spec.required && !parsed.is_present(spec.long))
        .map(|spec| spec.long.to_string())
        .collect();

    let mut invalid = Vec::new();
    for spec in specs {
        let Some(check) = spec.validator else { continue };
        for value in parsed.raw_values(spec.long) {
            if let Err(reason) = check(value) {
                invalid.push(format!("invalid value for --{}: {}", spec.long, reason));
            }
        }
    }

    if missing.is_empty() && invalid.is_empty() {
        return Ok(());
    }

    let mut problems = Vec::new();
    if !missing.is_empty() {
        let quoted: Vec<String> = missing.iter().map(|m| format!("\"{}\"", m)).collect();
        problems.push(format!("required flag(s) {} not set", quoted.join(", ")));
    }
    problems.extend(invalid);

    Err(CtlError::validation(problems.join("; ")).with_missing_flags(missing))
}

/// Long or short names declared more than once
pub fn duplicate_names(specs: &[FlagSpec]) -> Vec<String> {
    let mut seen_long = std::collections::HashSet::new();
    let mut seen_short = std::collections::HashSet::new();
    let mut dups = Vec::new();
    for spec in specs {
        if !seen_long.insert(spec.long) {
            dups.push(format!("--{}", spec.long));
        }
        if let Some(short) = spec.short {
            if !seen_short.insert(short) {
                dups.push(format!("-{}", short));
            }
        }
    }
    dups
}

/// A typed, closed aggregate of flag values for one command (or a reusable
/// group of flags embedded in one).
pub trait Options: fmt::Debug {
    /// The flags this aggregate binds, in declaration order.
    fn flag_specs() -> Vec<FlagSpec>
    where
        Self: Sized;

    /// Copy resolved values into the aggregate.
    fn bind(&mut self, flags: &ParsedFlags);
}

/// `KEY=VALUE` with a non-empty key
pub fn check_env_pair(value: &str) -> Result<(), String> {
    match value.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(()),
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}

/// Non-empty after trimming
pub fn check_not_blank(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("must not be empty".into())
    } else {
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────
// Shared flag groups
// ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceFlags {
    pub name: String,
}

impl Options for NamespaceFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        vec![FlagSpec::single("namespace", "Specified namespace")
            .short('n')
            .required()
            .validate(check_not_blank)]
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.name = flags.string("namespace");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFlags {
    pub namespace_flags: NamespaceFlags,
    pub name: String,
}

impl Options for ServiceFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = NamespaceFlags::flag_specs();
        specs.push(
            FlagSpec::single("service", "Specified service")
                .short('s')
                .required()
                .validate(check_not_blank),
        );
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.namespace_flags.bind(flags);
        self.name = flags.string("service");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountFlags {
    pub namespace_flags: NamespaceFlags,
    pub name: String,
}

impl Options for ServiceAccountFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = NamespaceFlags::flag_specs();
        specs.push(
            FlagSpec::single("service-account", "Specified service account")
                .short('a')
                .required()
                .validate(check_not_blank),
        );
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.namespace_flags.bind(flags);
        self.name = flags.string("service-account");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretFlags {
    pub namespace_flags: NamespaceFlags,
    pub name: String,
}

impl Options for SecretFlags {
    fn flag_specs() -> Vec<FlagSpec> {
        let mut specs = NamespaceFlags::flag_specs();
        specs.push(
            FlagSpec::single("secret", "Specified secret")
                .short('s')
                .required()
                .validate(check_not_blank),
        );
        specs
    }

    fn bind(&mut self, flags: &ParsedFlags) {
        self.namespace_flags.bind(flags);
        self.name = flags.string("secret");
    }
}
