use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{self, AsyncBufReadExt, BufReader};

use polysolve_host::{
    init_tracing_subsystem, DispatchError, Dispatcher, Envelope, EventSink, HostConfig,
    PolynomialBackend, RequestKind, RuntimeManager,
};

/// Reads wire requests (one JSON object per line) from stdin and prints every
/// routed event as a JSON line on stdout.
///
/// Calculations are serialized: the harness drains before issuing the next one
/// so scripted runs never hit the single in-flight limit.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing_subsystem();

    let config = HostConfig::from_env();
    tracing::info!(target = "polysolve", ?config, "harness starting");

    let sink = Arc::new(EventSink::new(std::io::stdout()));
    let dispatcher = Dispatcher::new(RuntimeManager::new(), sink, config.timeouts);
    dispatcher
        .start(PolynomialBackend::new(config.boot_delay))
        .context("start numeric runtime")?;

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read request line")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let envelope = match Envelope::decode(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(target = "polysolve", error = %err, "skipping malformed request line");
                continue;
            }
        };

        if envelope.kind() != RequestKind::Format && dispatcher.router().is_busy() {
            dispatcher.drain().await;
        }

        match dispatcher.dispatch(envelope.request, envelope.id) {
            Ok(_) => {}
            // Already routed to the sink as a slot error.
            Err(DispatchError::Input(_)) => {}
            Err(
                err @ (DispatchError::Bootstrap(_)
                | DispatchError::RuntimeLost(_)
                | DispatchError::Terminated),
            ) => {
                tracing::error!(target = "polysolve", error = %err, "runtime unavailable");
                break;
            }
            Err(err) => {
                tracing::warn!(target = "polysolve", error = %err, "request rejected");
            }
        }
    }

    dispatcher.drain().await;
    dispatcher.shutdown();
    tracing::info!(target = "polysolve", "harness finished");
    Ok(())
}
