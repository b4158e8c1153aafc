//! Log setup. stdout belongs to the hook payload, so logs go to stderr and
//! to `turnguard.log` in the state directory.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_LOG: &str = "TURNGUARD_LOG";

pub fn init(log_path: &Path, verbose: bool) {
    let filter = EnvFilter::new(directive(verbose, std::env::var(ENV_LOG).ok()));

    let file_layer = open_log_file(log_path).map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
    });

    // a second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init();
}

fn directive(verbose: bool, from_env: Option<String>) -> String {
    if verbose {
        return "debug".to_string();
    }
    from_env
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}
