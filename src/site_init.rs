//! Purpose: Resolve and source the optional site-specific init script.
//! Exports: `SiteInit`, `SITE_INIT_VAR`.
//! Role: Trusted override hook; site scripts run with full process privilege.
//! Invariants: A missing script is skipped, never an error.
//! Invariants: Sourcing completes before the launcher's own search-path edits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::environment::ProcessEnv;
use crate::error::{Error, ErrorKind};
use crate::paths::InstallLayout;

/// Overrides the default site-init location (`<root>/etc/site-init`).
pub const SITE_INIT_VAR: &str = "IMPROVER_SITE_INIT";

/// Sources the script in a strict POSIX shell, then prints the resulting
/// environment NUL-separated so values containing newlines survive.
const SOURCE_SCRIPT: &str = r#". "$1" && env -0"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInit {
    path: PathBuf,
    overridden: bool,
}

impl SiteInit {
    /// Picks the override from `IMPROVER_SITE_INIT` when set and non-empty,
    /// else the default location under the install root.
    pub fn resolve(env: &ProcessEnv, layout: &InstallLayout) -> Self {
        match env.get(SITE_INIT_VAR) {
            Some(path) if !path.is_empty() => Self {
                path: PathBuf::from(path),
                overridden: true,
            },
            _ => Self {
                path: layout.default_site_init(),
                overridden: false,
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn overridden(&self) -> bool {
        self.overridden
    }

    /// Sources the script into `env` if it exists as a file. Returns whether
    /// sourcing happened. Script stderr passes through to the launcher's
    /// stderr unfiltered.
    pub fn source_into(&self, env: &mut ProcessEnv) -> Result<bool, Error> {
        if !self.path.is_file() {
            debug!(
                path = %self.path.display(),
                overridden = self.overridden,
                "site-init absent, skipping"
            );
            return Ok(false);
        }
        let output = Command::new("sh")
            .arg("-eu")
            .arg("-c")
            .arg(SOURCE_SCRIPT)
            .arg("sh")
            .arg(&self.path)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to run the site-init shell")
                    .with_path(&self.path)
                    .with_source(err)
            })?;
        if !output.status.success() {
            return Err(Error::new(ErrorKind::SiteInit)
                .with_message(format!("site-init script failed ({})", output.status))
                .with_path(&self.path)
                .with_hint(
                    "The script runs under `sh -eu`; any command failure or \
                     unset-variable use aborts the launch.",
                ));
        }
        let snapshot = parse_env_dump(&output.stdout);
        if snapshot.is_empty() {
            return Err(Error::new(ErrorKind::SiteInit)
                .with_message("site-init environment dump was empty")
                .with_path(&self.path)
                .with_hint("Sourcing relies on `env -0`; check that the script leaves stdout alone."));
        }
        debug!(
            path = %self.path.display(),
            vars = snapshot.len(),
            "adopted site-init environment"
        );
        env.adopt(snapshot);
        Ok(true)
    }
}

/// Splits a NUL-separated `env -0` dump into name/value pairs. Values are
/// raw bytes; only the first `=` separates name from value. Entries without
/// a separator or with an empty name are dropped.
fn parse_env_dump(dump: &[u8]) -> Vec<(OsString, OsString)> {
    dump.split(|byte| *byte == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let split = entry.iter().position(|byte| *byte == b'=')?;
            if split == 0 {
                return None;
            }
            Some((bytes_to_os(&entry[..split]), bytes_to_os(&entry[split + 1..])))
        })
        .collect()
}

#[cfg(unix)]
fn bytes_to_os(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(bytes).to_os_string()
}

#[cfg(not(unix))]
fn bytes_to_os(bytes: &[u8]) -> OsString {
    OsString::from(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::{SITE_INIT_VAR, SiteInit, parse_env_dump};
    use crate::environment::ProcessEnv;
    use crate::error::ErrorKind;
    use crate::paths::InstallLayout;
    use std::ffi::{OsStr, OsString};
    use std::path::Path;

    fn layout() -> InstallLayout {
        InstallLayout::from_launcher_path(Path::new("/opt/improver/bin/improver")).expect("layout")
    }

    #[test]
    fn resolve_prefers_the_override_variable() {
        let mut env = ProcessEnv::default();
        env.set(SITE_INIT_VAR, "/etc/custom-init");
        let site_init = SiteInit::resolve(&env, &layout());
        assert_eq!(site_init.path(), Path::new("/etc/custom-init"));
        assert!(site_init.overridden());
    }

    #[test]
    fn resolve_falls_back_to_the_default_location() {
        let site_init = SiteInit::resolve(&ProcessEnv::default(), &layout());
        assert_eq!(site_init.path(), Path::new("/opt/improver/etc/site-init"));
        assert!(!site_init.overridden());
    }

    #[test]
    fn resolve_treats_an_empty_override_as_unset() {
        let mut env = ProcessEnv::default();
        env.set(SITE_INIT_VAR, "");
        let site_init = SiteInit::resolve(&env, &layout());
        assert!(!site_init.overridden());
    }

    #[test]
    fn parse_env_dump_splits_on_nul_and_first_equals() {
        let dump = b"A=1\0B=x=y\0C=\0";
        let pairs = parse_env_dump(dump);
        assert_eq!(
            pairs,
            vec![
                (OsString::from("A"), OsString::from("1")),
                (OsString::from("B"), OsString::from("x=y")),
                (OsString::from("C"), OsString::from("")),
            ]
        );
    }

    #[test]
    fn parse_env_dump_keeps_values_with_newlines() {
        let dump = b"MULTI=line1\nline2\0";
        let pairs = parse_env_dump(dump);
        assert_eq!(pairs, vec![(
            OsString::from("MULTI"),
            OsString::from("line1\nline2"),
        )]);
    }

    #[test]
    fn parse_env_dump_drops_malformed_entries() {
        let dump = b"NOSEPARATOR\0=anonymous\0OK=1\0";
        let pairs = parse_env_dump(dump);
        assert_eq!(pairs, vec![(OsString::from("OK"), OsString::from("1"))]);
    }

    #[test]
    fn source_into_skips_a_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut env = ProcessEnv::default();
        env.set(SITE_INIT_VAR, temp.path().join("absent"));
        let site_init = SiteInit::resolve(&env, &layout());
        let before = env.clone();
        assert!(!site_init.source_into(&mut env).expect("skip"));
        assert_eq!(env, before);
    }

    #[cfg(unix)]
    #[test]
    fn source_into_adopts_script_exports_and_unsets() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("site-init");
        std::fs::write(
            &script,
            "SOURCED_MARKER=sourced\nexport SOURCED_MARKER\nunset DOOMED_MARKER\n",
        )
        .expect("write script");

        let mut env = ProcessEnv::capture();
        env.set(SITE_INIT_VAR, &script);
        env.set("DOOMED_MARKER", "present");
        env.set("KEPT_MARKER", "kept");
        let site_init = SiteInit::resolve(&env, &layout());

        assert!(site_init.source_into(&mut env).expect("sourced"));
        assert_eq!(env.get("SOURCED_MARKER"), Some(OsStr::new("sourced")));
        assert_eq!(env.get("KEPT_MARKER"), Some(OsStr::new("kept")));
        assert_eq!(env.get("DOOMED_MARKER"), None);
    }

    #[cfg(unix)]
    #[test]
    fn source_into_reports_script_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("site-init");
        std::fs::write(&script, "exit 7\n").expect("write script");

        let mut env = ProcessEnv::capture();
        env.set(SITE_INIT_VAR, &script);
        let site_init = SiteInit::resolve(&env, &layout());

        let err = site_init.source_into(&mut env).expect_err("failure");
        assert_eq!(err.kind(), ErrorKind::SiteInit);
    }
}
