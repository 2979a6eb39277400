use std::{fs::OpenOptions, io, path::Path, sync::Arc};

use tracing_subscriber::{
    fmt::writer::MakeWriterExt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Registry,
};

use crate::{errors::Error, Result};

/// Runtime handle over the global log filter.
///
/// Cloned into the bot so the `tg_debug_logging` toggle can switch between
/// `info` and `debug` without restarting.
#[derive(Clone, Default)]
pub struct LogHandle {
    inner: Option<reload::Handle<EnvFilter, Registry>>,
    service: String,
}

impl LogHandle {
    /// A handle that changes nothing (tests, or logging never initialised).
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn set_debug(&self, enabled: bool) -> Result<()> {
        let Some(handle) = &self.inner else {
            return Ok(());
        };
        let level = if enabled { "debug" } else { "info" };
        handle
            .modify(|f| *f = default_filter(&self.service, level))
            .map_err(|e| Error::Config(format!("failed to reload log filter: {e}")))
    }
}

/// Initialize tracing for the bot: one fmt layer written to stdout and to an
/// append-mode log file.
///
/// `RUST_LOG` wins over the built-in default; when `debug` is set the default
/// level is `debug` instead of `info`.
pub fn init(service_name: &str, log_file: &Path, debug: bool) -> Result<LogHandle> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let file = Arc::new(file);

    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(service_name, level));
    let (filter, handle) = reload::Layer::new(filter);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout.and(file))
        .with_target(false)
        .with_ansi(false);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to set global subscriber: {e}")))?;

    Ok(LogHandle {
        inner: Some(handle),
        service: service_name.to_string(),
    })
}

fn default_filter(service_name: &str, level: &str) -> EnvFilter {
    // Our crates follow the toggle; HTTP internals stay at warn.
    EnvFilter::new(format!(
        "warn,ttb={level},ttb_core={level},ttb_gemini={level},ttb_weather={level},ttb_hariku={level},{service_name}={level}"
    ))
}
