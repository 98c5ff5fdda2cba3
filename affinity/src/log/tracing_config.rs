// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use tracing_core::LevelFilter;

/// Default log file path, relative to the working directory.
pub const DEFAULT_LOG_FILE_PATH: &str = "affinity_groups_debug.log";

/// Where logs go, and how verbose they are.
///
/// Logging is **off** by default ([`WriterConfig::None`] and [`LevelFilter::OFF`]).
/// Install a config with [`install_global()`] or [`install_thread_local()`].
///
/// Fields:
/// - `writer_config`: [`WriterConfig`] to choose where to write the logs.
/// - `level_filter`: the most verbose level that is recorded.
///
/// [`install_global()`]: Self::install_global
/// [`install_thread_local()`]: Self::install_thread_local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub writer_config: WriterConfig,
    pub level_filter: LevelFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterConfig {
    None,
    Display(DisplayPreference),
    File(String /* log file path */),
    DisplayAndFile(DisplayPreference, String /* log file path */),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPreference {
    Stdout,
    Stderr,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            writer_config: WriterConfig::None,
            level_filter: LevelFilter::OFF,
        }
    }
}

impl TracingConfig {
    /// Logs to both the given display and a file, at `DEBUG`.
    #[must_use]
    pub fn new_file_and_display(
        file_path: Option<String>,
        preferred_display: DisplayPreference,
    ) -> Self {
        Self {
            writer_config: WriterConfig::DisplayAndFile(
                preferred_display,
                file_path.unwrap_or_else(|| DEFAULT_LOG_FILE_PATH.to_string()),
            ),
            level_filter: LevelFilter::DEBUG,
        }
    }

    #[must_use]
    pub fn new_display(preferred_display: DisplayPreference) -> Self {
        Self {
            writer_config: WriterConfig::Display(preferred_display),
            level_filter: LevelFilter::DEBUG,
        }
    }

    #[must_use]
    pub fn new_file(file_path: Option<String>) -> Self {
        Self {
            writer_config: WriterConfig::File(
                file_path.unwrap_or_else(|| DEFAULT_LOG_FILE_PATH.to_string()),
            ),
            level_filter: LevelFilter::DEBUG,
        }
    }

    #[must_use]
    pub fn with_level_filter(mut self, level_filter: LevelFilter) -> Self {
        self.level_filter = level_filter;
        self
    }

    /// Whether installing this config would record anything at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.level_filter != LevelFilter::OFF && self.writer_config != WriterConfig::None
    }
}

impl From<LevelFilter> for TracingConfig {
    /// Display on stderr at the given level, so stdout stays free for program output.
    fn from(level_filter: LevelFilter) -> Self {
        Self::new_display(DisplayPreference::Stderr).with_level_filter(level_filter)
    }
}
