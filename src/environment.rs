//! Purpose: Composed environment table handed to the dispatcher at handoff.
//! Exports: `ProcessEnv`, `PATH_VAR`, `MODULE_PATH_VAR`.
//! Role: Make every launcher environment mutation explicit and inspectable.
//! Invariants: The launcher's own global environment is never mutated.
//! Invariants: Search-path prepends extend existing values, never replace them.

use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, ErrorKind};

/// Executable search path, extended with `<root>/bin`.
pub const PATH_VAR: &str = "PATH";
/// Module search path of the dispatcher runtime, extended with the root.
pub const MODULE_PATH_VAR: &str = "PYTHONPATH";

/// Variables the sourcing shell maintains for itself; changes to these are
/// not site-init edits and are never adopted.
const SHELL_BOOKKEEPING: [&str; 4] = ["_", "SHLVL", "PWD", "OLDPWD"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl ProcessEnv {
    pub fn capture() -> Self {
        Self {
            vars: env::vars_os().collect(),
        }
    }

    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(name.as_ref()).map(OsString::as_os_str)
    }

    pub fn set(&mut self, name: impl AsRef<OsStr>, value: impl AsRef<OsStr>) {
        self.vars
            .insert(name.as_ref().to_os_string(), value.as_ref().to_os_string());
    }

    pub fn remove(&mut self, name: impl AsRef<OsStr>) {
        self.vars.remove(name.as_ref());
    }

    /// Puts `entry` first in the named path list, keeping whatever was
    /// there. An unset or empty previous value yields just `entry`.
    pub fn prepend_path(&mut self, name: &str, entry: &Path) -> Result<(), Error> {
        let mut parts = vec![entry.to_path_buf()];
        if let Some(existing) = self.get(name) {
            if !existing.is_empty() {
                parts.extend(env::split_paths(existing));
            }
        }
        let joined = env::join_paths(parts).map_err(|err| {
            Error::new(ErrorKind::Env)
                .with_message("search-path entry cannot be joined into a path list")
                .with_var(name)
                .with_path(entry)
                .with_source(err)
        })?;
        debug!(var = name, entry = %entry.display(), "prepended search path");
        self.vars.insert(OsString::from(name), joined);
        Ok(())
    }

    /// Replaces the table with a post-source environment snapshot. The
    /// shell's own bookkeeping variables keep their pre-source values, so
    /// adoption reflects only what the script itself did.
    pub fn adopt(&mut self, snapshot: Vec<(OsString, OsString)>) {
        let mut adopted: BTreeMap<OsString, OsString> = snapshot.into_iter().collect();
        for name in SHELL_BOOKKEEPING {
            let name = OsStr::new(name);
            match self.vars.get(name) {
                Some(original) => {
                    adopted.insert(name.to_os_string(), original.clone());
                }
                None => {
                    adopted.remove(name);
                }
            }
        }
        self.vars = adopted;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars
            .iter()
            .map(|(name, value)| (name.as_os_str(), value.as_os_str()))
    }
}
