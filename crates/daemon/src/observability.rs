// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Tracing initialization.

use crate::config::ObservabilitySection;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber once, from config plus `RUST_LOG`.
///
/// Returns the file-appender guard when logging to a file; dropping it
/// flushes buffered output, so the caller holds it for the process lifetime.
pub fn init(config: &ObservabilitySection) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match &config.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or(std::path::Path::new("."));
            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string());
            let appender = tracing_appender::rolling::never(
                directory,
                file_name.unwrap_or_else(|| "siftd.log".to_string()),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
            None
        }
    }
}
