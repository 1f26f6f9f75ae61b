//! Purpose: Install-layout resolution for the launcher binary.
//! Exports: `InstallLayout`, `INSTALL_ROOT_VAR`.
//! Role: Keep the binary and tests agreed on how the installation root is derived.
//! Invariants: The root is the parent of the directory containing the launcher.
//! Invariants: Default site-init location remains `<root>/etc/site-init`.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, ErrorKind};

/// Exported to the site-init script and the dispatcher.
pub const INSTALL_ROOT_VAR: &str = "IMPROVER_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    /// Resolves the layout from the running executable's location, with
    /// symlinks resolved so the result is independent of how the launcher
    /// was invoked.
    pub fn discover() -> Result<Self, Error> {
        let exe = env::current_exe().map_err(|err| {
            Error::new(ErrorKind::Resolve)
                .with_message("failed to locate the launcher executable")
                .with_source(err)
        })?;
        let exe = exe.canonicalize().map_err(|err| {
            Error::new(ErrorKind::Resolve)
                .with_message("failed to canonicalize the launcher path")
                .with_path(&exe)
                .with_source(err)
        })?;
        let layout = Self::from_launcher_path(&exe)?;
        if !layout.root.is_dir() {
            return Err(Error::new(ErrorKind::Resolve)
                .with_message("installation root is not a directory")
                .with_path(&layout.root));
        }
        debug!(root = %layout.root.display(), "resolved installation root");
        Ok(layout)
    }

    /// Pure derivation: the launcher lives in `<root>/bin`, so the root is
    /// the grandparent of the launcher path.
    pub fn from_launcher_path(launcher: &Path) -> Result<Self, Error> {
        let bin_dir = launcher
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::new(ErrorKind::Resolve)
                    .with_message("launcher path has no containing directory")
                    .with_path(launcher)
            })?;
        let root = bin_dir
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| {
                Error::new(ErrorKind::Resolve)
                    .with_message("launcher directory has no parent to use as the installation root")
                    .with_path(launcher)
            })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn default_site_init(&self) -> PathBuf {
        self.root.join("etc").join("site-init")
    }
}
