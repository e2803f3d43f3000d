//! Command factory
//!
//! A [`Command`] binds an [`Options`] aggregate to a clap parser, a handler
//! and an injected [`DepsFactory`]. Parsing (tokenize, validate, bind) and
//! invoking the handler are separate steps so the test harness can stop in
//! between. [`CommandTree`] assembles commands into the binary's command
//! hierarchy and dispatches an argument vector to the matching leaf.

use std::ffi::OsString;
use std::io::Write;
use std::rc::Rc;

use clap::ArgMatches;

use crate::deps::DepsFactory;
use crate::error::{CtlError, ErrorKind};
use crate::flags::{self, FlagSpec, Options, ParsedFlags};

/// Handler invoked with fully bound options, the injected deps and the output sink
pub type Handler<O, D> = fn(&O, &D, &mut dyn Write) -> anyhow::Result<()>;

/// A runnable command over options `O` and deps `D`
pub struct Command<O, D> {
    name: &'static str,
    about: &'static str,
    options: O,
    specs: Vec<FlagSpec>,
    deps: Rc<D>,
    handler: Handler<O, D>,
}

impl<O: Options, D: DepsFactory> Command<O, D> {
    pub fn new(name: &'static str, about: &'static str, options: O, deps: Rc<D>, handler: Handler<O, D>) -> Self {
        let specs = O::flag_specs();
        debug_assert!(
            flags::duplicate_names(&specs).is_empty(),
            "command {} declares duplicate flags: {:?}",
            name,
            flags::duplicate_names(&specs),
        );
        Self { name, about, options, specs, deps, handler }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn about(&self) -> &'static str {
        self.about
    }

    /// Bound options; only meaningful after a successful parse
    pub fn options(&self) -> &O {
        &self.options
    }

    pub fn flag_specs(&self) -> &[FlagSpec] {
        &self.specs
    }

    pub fn deps(&self) -> &D {
        &self.deps
    }

    pub fn clap_command(&self) -> clap::Command {
        clap::Command::new(self.name)
            .about(self.about)
            .args(self.specs.iter().map(FlagSpec::to_arg))
    }

    /// Validate clap's matches and bind them into the options.
    ///
    /// Options are left untouched when validation fails.
    pub fn bind_matches(&mut self, matches: &ArgMatches) -> Result<(), CtlError> {
        let parsed = ParsedFlags::from_matches(&self.specs, matches);
        flags::validate(&self.specs, &parsed).map_err(|e| e.with_command(self.name))?;
        self.options.bind(&parsed);
        Ok(())
    }

    /// Parse an argument vector (without the command name) into the options.
    pub fn parse<S: AsRef<str>>(&mut self, args: &[S]) -> Result<(), CtlError> {
        let matches = self
            .clap_command()
            .no_binary_name(true)
            .try_get_matches_from(args.iter().map(|a| a.as_ref()))
            .map_err(|e| usage_error(self.name, &e))?;
        self.bind_matches(&matches)
    }

    /// Run the handler against the bound options.
    pub fn invoke(&self, out: &mut dyn Write) -> Result<(), CtlError> {
        tracing::debug!(command = self.name, options = ?self.options, "invoking command");
        (self.handler)(&self.options, &self.deps, out).map_err(CtlError::from_anyhow)
    }

    /// Parse, then invoke.
    pub fn execute<S: AsRef<str>>(&mut self, args: &[S], out: &mut dyn Write) -> Result<(), CtlError> {
        self.parse(args)?;
        self.invoke(out)
    }
}

fn usage_error(command: &str, err: &clap::Error) -> CtlError {
    CtlError::usage(err.render().to_string().trim_end().to_string()).with_command(command)
}

/// Type-erased leaf of a [`CommandTree`]
pub trait Runnable {
    fn name(&self) -> &'static str;
    fn build_clap(&self) -> clap::Command;
    fn run_matches(&mut self, matches: &ArgMatches, out: &mut dyn Write) -> Result<(), CtlError>;
}

impl<O: Options, D: DepsFactory> Runnable for Command<O, D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn build_clap(&self) -> clap::Command {
        self.clap_command()
    }

    fn run_matches(&mut self, matches: &ArgMatches, out: &mut dyn Write) -> Result<(), CtlError> {
        self.bind_matches(matches)?;
        self.invoke(out)
    }
}

/// A node in the command hierarchy
pub enum CommandNode {
    Leaf(Box<dyn Runnable>),
    Group {
        name: &'static str,
        about: &'static str,
        children: Vec<CommandNode>,
    },
}

impl CommandNode {
    pub fn leaf(cmd: impl Runnable + 'static) -> Self {
        CommandNode::Leaf(Box::new(cmd))
    }

    pub fn group(name: &'static str, about: &'static str, children: Vec<CommandNode>) -> Self {
        CommandNode::Group { name, about, children }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandNode::Leaf(cmd) => cmd.name(),
            CommandNode::Group { name, .. } => *name,
        }
    }

    fn clap_command(&self) -> clap::Command {
        match self {
            CommandNode::Leaf(cmd) => cmd.build_clap(),
            CommandNode::Group { name, about, children } => clap::Command::new(*name)
                .about(*about)
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommands(children.iter().map(CommandNode::clap_command)),
        }
    }
}

/// The binary's command hierarchy, built once per process
pub struct CommandTree {
    name: &'static str,
    about: &'static str,
    version: &'static str,
    children: Vec<CommandNode>,
}

impl CommandTree {
    pub fn new(name: &'static str, about: &'static str, version: &'static str) -> Self {
        Self { name, about, version, children: Vec::new() }
    }

    pub fn add(mut self, node: CommandNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn clap_command(&self) -> clap::Command {
        clap::Command::new(self.name)
            .about(self.about)
            .version(self.version)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommands(self.children.iter().map(CommandNode::clap_command))
    }

    /// Parse `args` (including the binary name) and run the selected leaf.
    pub fn run<I, T>(&mut self, args: I, out: &mut dyn Write) -> Result<(), CtlError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self
            .clap_command()
            .try_get_matches_from(args)
            .map_err(|e| usage_error(self.name, &e))?;
        dispatch(&mut self.children, &matches, out)
    }

    /// Like [`CommandTree::run`], but renders help, usage and command errors
    /// and returns the process exit code.
    pub fn run_to_exit_code<I, T>(&mut self, args: I, out: &mut dyn Write, err: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.clap_command().try_get_matches_from(args) {
            Ok(m) => m,
            Err(e) => {
                let rendered = e.render().to_string();
                let sink: &mut dyn Write = if e.use_stderr() { err } else { out };
                let _ = write!(sink, "{}", rendered);
                return e.exit_code();
            }
        };

        match dispatch(&mut self.children, &matches, out) {
            Ok(()) => 0,
            Err(e) => {
                tracing::debug!(kind = ?e.kind, "command failed");
                let _ = writeln!(err, "Error: {}", e);
                1
            }
        }
    }
}

fn dispatch(nodes: &mut [CommandNode], matches: &ArgMatches, out: &mut dyn Write) -> Result<(), CtlError> {
    let (name, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| CtlError::usage("a subcommand is required"))?;
    let node = nodes
        .iter_mut()
        .find(|node| node.name() == name)
        .ok_or_else(|| CtlError::new(ErrorKind::Usage, format!("unknown command '{}'", name)))?;
    match node {
        CommandNode::Leaf(cmd) => cmd.run_matches(sub_matches, out),
        CommandNode::Group { children, .. } => dispatch(children, sub_matches, out),
    }
}
