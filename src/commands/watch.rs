//! Watch command: follow a live pin map
//!
//! Hydrates a [`ClientSession`] from the pin API, keeps its push listener
//! running and logs a cache summary every few seconds until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use crate::cli::{OutputFormat, WatchArgs};
use crate::client::{Backoff, ClientSession, HttpPinApi};
use crate::commands::CommandContext;
use crate::error::{PinstreamError, Result};
use crate::reconciler::SharedReconciler;

/// Run a watch session
///
/// Creates its own tokio runtime, like every long-running command.
pub fn run_watch(args: &WatchArgs, ctx: &CommandContext) -> Result<String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| PinstreamError::Config {
        message: format!("Failed to create tokio runtime: {}", e),
    })?;

    let reconciler = runtime.block_on(async { run_watch_async(args).await })?;
    Ok(render_summary(&reconciler, ctx))
}

async fn run_watch_async(args: &WatchArgs) -> Result<SharedReconciler> {
    let api = Arc::new(HttpPinApi::new(&args.api_url)?);
    let backoff = Backoff {
        initial: Duration::from_millis(args.reconnect_ms.max(1)),
        max: Duration::from_millis(args.max_reconnect_ms.max(args.reconnect_ms)),
    };

    let register_timeout = Duration::from_secs(args.register_timeout_secs.max(1));
    let mut session = ClientSession::start(api, &args.ws_url, backoff, register_timeout).await?;
    tracing::info!(
        "Watching {} pin(s) from {}",
        session.reconciler().lock().len(),
        args.api_url
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(args.report_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let reconciler = session.reconciler().lock();
                tracing::info!(
                    "{} pin(s) cached, {:?}, {} delta(s) pending",
                    reconciler.len(),
                    reconciler.phase(),
                    reconciler.pending_len()
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown();
    Ok(session.reconciler().clone())
}

/// Final state of the cache, printed on exit
fn render_summary(reconciler: &SharedReconciler, ctx: &CommandContext) -> String {
    let reconciler = reconciler.lock();
    match ctx.format {
        OutputFormat::Json => {
            let pins: Vec<_> = reconciler.pins().into_iter().cloned().collect();
            let json = serde_json::json!({
                "count": pins.len(),
                "pins": pins,
            });
            format!("{}\n", serde_json::to_string_pretty(&json).unwrap_or_default())
        }
        OutputFormat::Text => {
            let mut out = format!("{} pin(s)\n", reconciler.len());
            if ctx.verbose {
                for pin in reconciler.pins() {
                    let label = if pin.custom_name.is_empty() {
                        pin.address
                            .as_ref()
                            .and_then(|a| a.display_name())
                            .unwrap_or("")
                    } else {
                        pin.custom_name.as_str()
                    };
                    out.push_str(&format!("  {}  {}\n", pin.point_url, label));
                }
            }
            out
        }
    }
}
