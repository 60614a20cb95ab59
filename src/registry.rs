//! Name to handler lookup for commands that run inside the shell process.

use crate::command::ExitCode;
use crate::parser::CommandLine;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Handler for an in-process command.
///
/// Receives the whole command line (`argv[0]` is the command name) and returns
/// a status. Handlers run synchronously and are always treated as foreground;
/// they may fork and wait internally.
pub type BuiltinFn = Arc<dyn Fn(&CommandLine) -> ExitCode + Send + Sync>;

/// Table of builtins consulted before any process is created.
#[derive(Default, Clone)]
pub struct BuiltinRegistry {
    handlers: HashMap<String, BuiltinFn>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the file-manipulation builtins shipped with the shell.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::builtin::register_defaults(&mut registry);
        registry
    }

    /// Registers `handler` under `name`, silently replacing an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&CommandLine) -> ExitCode + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinFn> {
        self.handlers.get(name).cloned()
    }

    /// The process-wide registry, filled with the defaults on first use and
    /// read-only afterwards.
    pub fn global() -> &'static BuiltinRegistry {
        static GLOBAL: OnceLock<BuiltinRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::with_defaults)
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("BuiltinRegistry")
            .field("handlers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_is_none() {
        let registry = BuiltinRegistry::new();
        assert!(registry.lookup("nope").is_none());
    }

    #[test]
    fn test_later_registration_replaces_earlier() {
        let mut registry = BuiltinRegistry::new();
        registry.register("greet", |_| 1);
        registry.register("greet", |cl| cl.argv.len() as ExitCode);

        let handler = registry.lookup("greet").unwrap();
        assert_eq!(handler(&CommandLine::new(["greet", "a", "b"])), 3);
    }

    #[test]
    fn test_defaults_are_registered() {
        let registry = BuiltinRegistry::global();
        for name in ["ls", "grep", "cp", "mv", "rm", "ln", "mkdir", "rmdir", "cat"] {
            assert!(registry.lookup(name).is_some(), "{name} missing");
        }
        for name in ["cd", "pwd", "exit"] {
            assert!(registry.lookup(name).is_none(), "{name} must not be a builtin");
        }
    }
}
