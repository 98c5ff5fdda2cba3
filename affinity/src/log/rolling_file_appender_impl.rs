// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use miette::IntoDiagnostic;
use std::path::Path;
use tracing_appender::rolling::RollingFileAppender;

/// Opens (appending) the log file at `path_str`, creating its parent folder if needed.
/// The file never rotates.
///
/// Note that if you wrap this up in a non blocking writer, logs from a loop thread that
/// exits right after logging can be lost. The writer is used directly.
///
/// # Errors
///
/// Returns an error if:
/// - The path has no file name
/// - The parent folder can't be created
pub fn try_create(path_str: &str) -> miette::Result<RollingFileAppender> {
    let path = Path::new(path_str);

    let file_name = path.file_name().ok_or_else(|| {
        miette::miette!("Log file path {} has no file name", path.display())
    })?;

    let parent = match path.parent() {
        Some(it) if !it.as_os_str().is_empty() => it,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).into_diagnostic()?;

    Ok(tracing_appender::rolling::never(parent, file_name))
}
