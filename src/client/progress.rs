use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{ sleep_until, Instant };

pub const CAPTIONS: [&str; 3] = [
    "Analyzing your message...",
    "Making it professional...",
    "Almost done...",
];

/// Offsets from the start of a submission at which the second and third
/// captions are shown. Purely cosmetic.
pub const CAPTION_DELAYS: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(4)];

/// Schedules the later progress captions. The timers are cancelled when the
/// value is dropped or `cancel` is called.
pub struct ProgressCaptions {
    handle: JoinHandle<()>,
}

impl ProgressCaptions {
    /// `apply` is invoked for each later caption and returns false once the
    /// captions no longer apply, which ends the schedule.
    pub fn start<F>(apply: F) -> Self
        where F: Fn(&'static str) -> bool + Send + 'static
    {
        let started = Instant::now();
        let handle = tokio::spawn(async move {
            for (delay, caption) in CAPTION_DELAYS.into_iter().zip(CAPTIONS.into_iter().skip(1)) {
                sleep_until(started + delay).await;
                if !apply(caption) {
                    return;
                }
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ProgressCaptions {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
