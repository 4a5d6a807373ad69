use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

use super::RunContext;

/// Publish the elapsed session time every tick
pub async fn stopwatch_loop(run: RunContext) {
    let RunContext {
        rig,
        session,
        clock,
        mut stop,
    } = run;

    let mut ticker = interval(rig.timing.stopwatch_tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Stopwatch started (session {})", session);

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => rig.telemetry.time(clock.elapsed_secs()),
        }
    }

    info!("Stopwatch stopped at {:.2} s (session {})", clock.elapsed_secs(), session);
}
