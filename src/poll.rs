//! Repeats a snapshot on a fixed period until cancelled.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::Result;

/// Runs `pass` immediately and then once every `period`, until `shutdown`
/// completes or a pass fails. A pass still in flight when `shutdown` fires
/// is dropped.
pub async fn run_until<F, Fut>(period: Duration, shutdown: impl Future, mut pass: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    tokio::pin!(shutdown);

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = &mut shutdown => break,
            res = pass() => res?,
        }
    }

    info!("polling stopped");
    Ok(())
}

/// Completes on Ctrl-C. If the signal handler cannot be installed the
/// future never completes.
pub async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("cannot listen for Ctrl-C: {}", err);
        std::future::pending::<()>().await;
    }
}
