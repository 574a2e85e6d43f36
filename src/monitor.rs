use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::device::{read_candidate, ClipboardDevice};
use crate::item::ClipboardItem;

pub const POLL_INTERVAL: Duration = Duration::from_millis(600);

/// Cooperative polling loop over a clipboard device. Owns the device,
/// compares change counters each tick (doing nothing while the counter sits
/// still), and sends normalized candidates to the owner task. Cancelable
/// through a `CancellationToken`; stopping twice is fine.
pub struct ClipboardMonitor<D: ClipboardDevice> {
    device: D,
    period: Duration,
}

impl<D: ClipboardDevice + Send + 'static> ClipboardMonitor<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            period: POLL_INTERVAL,
        }
    }

    pub fn with_period(device: D, period: Duration) -> Self {
        Self { device, period }
    }

    /// Run until cancelled or until the candidate receiver goes away.
    /// Whatever is on the clipboard when the loop starts is not captured;
    /// only changes after that are.
    pub async fn run(mut self, candidates: mpsc::Sender<ClipboardItem>, stop: CancellationToken) {
        let mut last_count = self.device.change_count();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::debug!("clipboard monitor stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let count = self.device.change_count();
            if count == last_count {
                continue;
            }
            last_count = count;

            match read_candidate(&mut self.device) {
                Some(item) => {
                    tracing::debug!(kind = item.kind.as_str(), "clipboard change captured");
                    if candidates.send(item).await.is_err() {
                        return;
                    }
                }
                None => tracing::debug!("clipboard change had no recognized format"),
            }
        }
    }

    /// Spawn the loop on the current runtime, returning the stop token.
    pub fn spawn(
        self,
        candidates: mpsc::Sender<ClipboardItem>,
    ) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(self.run(candidates, stop));
        (token, handle)
    }
}
