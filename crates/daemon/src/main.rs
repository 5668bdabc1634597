// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! siftd: the standalone ingestion and job daemon.
//!
//! Exit codes: 0 clean stop, 1 configuration error, 2 unrecoverable storage
//! error, 3 unrecoverable schema-registry error.

use sift_daemon::{Collaborators, Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

fn usage() -> ! {
    eprintln!("usage: siftd [--config <path>]");
    std::process::exit(1);
}

fn parse_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => usage(),
            },
            "--help" | "-h" => usage(),
            _ => usage(),
        }
    }
    config_path
}

fn main() -> ExitCode {
    let config_path = parse_args();
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("siftd: {e}");
            return ExitCode::from(1);
        }
    };

    let _log_guard = sift_daemon::observability::init(&config.observability);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(async {
        let daemon = match Daemon::start(config, Collaborators::default()).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!(error = %e, "startup failed");
                return ExitCode::from(e.exit_code() as u8);
            }
        };

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received"),
            Err(e) => error!(error = %e, "signal listener failed"),
        }

        daemon.shutdown().await;
        ExitCode::SUCCESS
    })
}
