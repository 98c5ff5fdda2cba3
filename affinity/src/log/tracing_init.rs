// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{DisplayPreference, TracingConfig, WriterConfig, rolling_file_appender_impl};
use miette::IntoDiagnostic;
use tracing::dispatcher::DefaultGuard;
use tracing_core::LevelFilter;
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, registry::LookupSpan,
                         util::SubscriberInitExt};

/// Type alias for a boxed layer.
pub type DynLayer<S> = dyn Layer<S> + Send + Sync + 'static;

/// Avoid gnarly type annotations by using a macro to create the `fmt` layer. Thread
/// names are on, since which loop ran an event is usually the point.
macro_rules! create_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_target(false)
    };
}

impl TracingConfig {
    /// Installs this config as the process-wide subscriber. Events from every loop
    /// thread are captured. Does nothing if the config [is disabled].
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed, or the log file
    /// can't be opened.
    ///
    /// [is disabled]: Self::is_enabled
    pub fn install_global(self) -> miette::Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let layers = try_create_layers(self)?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .into_diagnostic()
    }

    /// Installs this config for the calling thread only, until the returned guard is
    /// dropped. Returns [`None`] if the config [is disabled].
    ///
    /// Loop threads don't inherit it, so only events logged on the calling thread are
    /// captured. Handy for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be opened.
    ///
    /// [is disabled]: Self::is_enabled
    pub fn install_thread_local(self) -> miette::Result<Option<DefaultGuard>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let layers = try_create_layers(self)?;
        Ok(Some(tracing_subscriber::registry().with(layers).set_default()))
    }
}

/// Returns the layers. This does not install anything; see
/// [`TracingConfig::install_global()`] for that.
///
/// # Errors
///
/// Returns an error if the log file can't be opened.
pub fn try_create_layers(
    tracing_config: TracingConfig,
) -> miette::Result<Vec<Box<DynLayer<Registry>>>> {
    let TracingConfig {
        writer_config,
        level_filter,
    } = tracing_config;

    let mut return_it: Vec<Box<DynLayer<Registry>>> = vec![];

    // Set the level filter for the whole stack, so layers added later that have no
    // filter of their own still respect it.
    return_it.push(Box::new(level_filter));

    if let Some(layer) = try_create_display_layer(level_filter, &writer_config) {
        return_it.push(layer);
    }

    if let Some(layer) = try_create_file_layer(level_filter, &writer_config)? {
        return_it.push(layer);
    }

    Ok(return_it)
}

/// This erases the concrete type of the writer, and returns a boxed layer.
pub fn try_create_display_layer<S>(
    level_filter: LevelFilter,
    writer_config: &WriterConfig,
) -> Option<Box<DynLayer<S>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = create_fmt!();

    match writer_config {
        WriterConfig::DisplayAndFile(display_pref, _) | WriterConfig::Display(display_pref) => {
            match display_pref {
                DisplayPreference::Stdout => Some(Box::new(
                    fmt_layer
                        .with_writer(std::io::stdout)
                        .with_filter(level_filter),
                )),
                DisplayPreference::Stderr => Some(Box::new(
                    fmt_layer
                        .with_writer(std::io::stderr)
                        .with_filter(level_filter),
                )),
            }
        }
        WriterConfig::None | WriterConfig::File(_) => None,
    }
}

/// This erases the concrete type of the writer, and returns a boxed layer.
///
/// # Errors
///
/// Returns an error if the log file can't be opened.
pub fn try_create_file_layer<S>(
    level_filter: LevelFilter,
    writer_config: &WriterConfig,
) -> miette::Result<Option<Box<DynLayer<S>>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    match writer_config {
        WriterConfig::DisplayAndFile(_, file_path) | WriterConfig::File(file_path) => {
            let file = rolling_file_appender_impl::try_create(file_path)?;
            Ok(Some(Box::new(
                create_fmt!()
                    .with_ansi(false)
                    .with_writer(file)
                    .with_filter(level_filter),
            )))
        }
        WriterConfig::None | WriterConfig::Display(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventLoopThread, dispatch_and_wait};
    use affinity_test_fixtures::try_create_temp_dir;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_try_create_display_layer() {
        let writer_config = WriterConfig::Display(DisplayPreference::Stdout);
        let layer: Option<Box<DynLayer<Registry>>> =
            try_create_display_layer(LevelFilter::DEBUG, &writer_config);
        assert!(layer.is_some());

        let layer: Option<Box<DynLayer<Registry>>> =
            try_create_display_layer(LevelFilter::DEBUG, &WriterConfig::None);
        assert!(layer.is_none());
    }

    #[test]
    fn test_try_create_both_layers() {
        let dir = try_create_temp_dir().unwrap();
        let file_path = dir.join("both.log").to_str().unwrap().to_string();

        let layers = try_create_layers(TracingConfig::new_file_and_display(
            Some(file_path.clone()),
            DisplayPreference::Stderr,
        ))
        .unwrap();

        assert_eq!(layers.len(), 3);
        assert!(std::path::Path::new(&file_path).exists());
    }

    #[test]
    fn test_disabled_config_installs_nothing() {
        let guard = TracingConfig::default().install_thread_local().unwrap();
        assert!(guard.is_none());
    }

    #[test]
    fn test_thread_local_subscriber_writes_to_file() {
        let dir = try_create_temp_dir().unwrap();
        let file_path = dir.join("thread_local.log").to_str().unwrap().to_string();

        let guard = TracingConfig::new_file(Some(file_path.clone()))
            .with_level_filter(LevelFilter::INFO)
            .install_thread_local()
            .unwrap();
        tracing::info!(message = "visible on this thread");
        tracing::debug!(message = "filtered out");
        drop(guard);

        let output = std::fs::read_to_string(&file_path).unwrap();
        assert!(output.contains("visible on this thread"));
        assert!(!output.contains("filtered out"));
    }

    /// The only test that installs the process-wide subscriber.
    #[test]
    #[serial]
    fn test_global_subscriber_captures_loop_thread_failures() {
        let dir = try_create_temp_dir().unwrap();
        let file_path = dir.join("global.log").to_str().unwrap().to_string();
        TracingConfig::new_file(Some(file_path.clone()))
            .with_level_filter(LevelFilter::WARN)
            .install_global()
            .unwrap();

        let mut event_loop = EventLoopThread::builder().name("logged-loop").build();
        event_loop.start().unwrap();
        let handle = event_loop.readiness().wait().unwrap();
        handle.post(|_| panic!("lost in the loop")).unwrap();
        // Shutdown overtakes pending Normal items, so let the pump reach the panic first.
        dispatch_and_wait(&handle, |_| ()).unwrap();
        event_loop.stop().unwrap();
        assert_eq!(handle.unobserved_failure_count(), 1);

        let output = std::fs::read_to_string(&file_path).unwrap();
        assert!(output.contains("logged-loop"));
        assert!(output.contains("lost in the loop"));

        // A second global install is refused.
        assert!(TracingConfig::new_file(Some(file_path)).install_global().is_err());
    }
}
