//! Purpose: Shared launcher library used by the `improver` binary and tests.
//! Exports: `dispatch`, `environment`, `error`, `paths`, `site_init`.
//! Role: Internal library backing the binary; not a stable public SDK.
//! Invariants: Bootstrap steps are explicit functions over explicit state.
//! Invariants: No module mutates the launcher's own global environment.
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod paths;
pub mod site_init;
