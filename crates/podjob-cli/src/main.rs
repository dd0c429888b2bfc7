//! `podman` binary: runs containers as Kubernetes Jobs

use std::io::Write;

use podjob_common::error::EXIT_FAILURE;
use podjob_common::telemetry::{init_telemetry, TelemetryConfig};

use podjob_cli::{dispatch, InClusterBackend};

fn main() {
    let telemetry = TelemetryConfig::from_env().unwrap_or_else(|e| {
        eprintln!("warning: {}, using text diagnostics", e);
        TelemetryConfig::default()
    });
    if let Err(e) = init_telemetry(telemetry) {
        eprintln!("warning: {}", e);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    tracing::debug!(?args, "invoked");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start async runtime");
            std::process::exit(EXIT_FAILURE);
        }
    };

    let mut stdout = std::io::stdout().lock();
    let code = runtime.block_on(dispatch(&args, &InClusterBackend, &mut stdout));
    if let Err(e) = stdout.flush() {
        tracing::warn!(error = %e, "failed to flush stdout");
    }

    std::process::exit(code);
}
