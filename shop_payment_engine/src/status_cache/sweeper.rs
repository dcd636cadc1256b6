use std::time::Duration;

use log::*;
use tokio::task::JoinHandle;

use super::StatusCache;

/// Starts the sweeper. Do not await the returned JoinHandle, as it will run indefinitely. Abort it to stop sweeping.
pub fn start_sweeper(cache: StatusCache, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Payment status sweeper started. Running every {}s", period.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running payment status sweep");
            let removed = cache.sweep_expired();
            if removed > 0 {
                debug!("🕰️ {removed} expired payment statuses removed. {} remain", cache.len());
            }
        }
    })
}
