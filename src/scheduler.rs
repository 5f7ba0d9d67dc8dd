use std::ops::ControlFlow;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// When the first tick of a [`PeriodicTask`] fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    Immediate,
    AfterPeriod,
}

/// A fixed-cadence tick loop on the tokio runtime with a cancellation token.
///
/// Cancelling skips every tick that has not started yet. A tick already
/// running when `cancel` is called finishes, and the loop exits without
/// re-arming. Dropping the task cancels it.
pub struct PeriodicTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F>(runtime: &Handle, period: Duration, first: FirstTick, mut tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let start = match first {
            FirstTick::Immediate => Instant::now(),
            FirstTick::AfterPeriod => Instant::now() + period,
        };

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if tick().is_break() || loop_token.is_cancelled() {
                    break;
                }
            }
        });

        Self { token, handle }
    }

    /// Token that fires when this task is cancelled. Child tokens are
    /// cancelled along with it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
