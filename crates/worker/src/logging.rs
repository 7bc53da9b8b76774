//! Tracing setup.
//!
//! Besides the console layer, every outcome category gets its own log file,
//! fed by the `tracing` target the dispatcher emits that category under (see
//! [`OutcomeCategory::log_target`]). `info.log` receives every event at
//! `INFO` or above, whatever its target.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use opsync_core::outcome::OutcomeCategory;
use tracing::Level;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// File collecting all informational events.
pub const INFO_LOG_FILE: &str = "info.log";

/// Console filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "opsync=info,opsync_worker=info,opsync_db=info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

fn open_append(path: &Path) -> io::Result<Mutex<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Mutex::new(file))
}

/// One layer per outcome category plus `info.log`, writing into `dir`.
///
/// Creates `dir` if needed.
pub fn file_layers(dir: &Path) -> io::Result<Vec<BoxedLayer>> {
    fs::create_dir_all(dir)?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(OutcomeCategory::ALL.len() + 1);
    for category in OutcomeCategory::ALL {
        let target = category.log_target();
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(open_append(&dir.join(category.log_file_name()))?)
            .with_filter(filter_fn(move |meta| meta.target() == target));
        layers.push(Box::new(layer));
    }

    let info = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(open_append(&dir.join(INFO_LOG_FILE))?)
        .with_filter(LevelFilter::from_level(Level::INFO));
    layers.push(Box::new(info));

    Ok(layers)
}

/// Install the global subscriber: console plus the per-category files.
pub fn init(dir: &Path, format: LogFormat) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let console: BoxedLayer = match format {
        LogFormat::Text => Box::new(tracing_subscriber::fmt::layer().with_filter(filter)),
        LogFormat::Json => Box::new(tracing_subscriber::fmt::layer().json().with_filter(filter)),
    };

    let mut layers = file_layers(dir)?;
    layers.push(console);
    tracing_subscriber::registry().with(layers).init();
    Ok(())
}
