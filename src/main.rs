//! Purpose: `improver` launcher entry point.
//! Role: Binary crate root; bootstraps the environment and execs the dispatcher.
//! Invariants: Arguments reach the dispatcher verbatim; nothing is parsed here.
//! Invariants: All environment edits complete before the handoff.
//! Invariants: Process exit code is the dispatcher's, or `error::to_exit_code` before handoff.
use std::env;
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use improver_launcher::dispatch::{self, RunOutcome};
use improver_launcher::environment::{MODULE_PATH_VAR, PATH_VAR, ProcessEnv};
use improver_launcher::error::{Error, ErrorKind, to_exit_code};
use improver_launcher::paths::{INSTALL_ROOT_VAR, InstallLayout};
use improver_launcher::site_init::SiteInit;

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    init_tracing();
    let args: Vec<OsString> = env::args_os().skip(1).collect();
    debug!(forwarded = args.len(), "bootstrap starting");

    let layout = InstallLayout::discover()?;
    let mut env = ProcessEnv::capture();
    env.set(INSTALL_ROOT_VAR, layout.root());

    let site_init = SiteInit::resolve(&env, &layout);
    site_init.source_into(&mut env)?;

    env.prepend_path(PATH_VAR, &layout.bin_dir())?;
    env.prepend_path(MODULE_PATH_VAR, layout.root())?;

    dispatch::handoff(&env, &args)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn emit_error(err: &Error) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, true));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Env => "environment composition failed".to_string(),
        ErrorKind::Resolve => "installation root resolution failed".to_string(),
        ErrorKind::SiteInit => "site-init script failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Handoff => "dispatcher handoff failed".to_string(),
        ErrorKind::NotFound => "dispatcher not found".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(var) = err.var() {
        lines.push(format!(
            "{} {var}",
            colorize_label("var:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    if let Some(time) = now_rfc3339() {
        inner.insert("time".to_string(), json!(time));
    }
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(var) = err.var() {
        inner.insert("var".to_string(), json!(var));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
