//! Status indicator: a four-state machine with an animated running frame.
//!
//! ```text
//! Idle ──verify──▶ Running ──▶ Success
//!   ▲                 │  ▲
//!   │                 ▼  │ verify
//!   └──reset──────── Failed
//! ```
//!
//! Any state may go back to `Running`. While running, a ticker task flips the
//! frame every [`TICK_INTERVAL`]; every transition out of `Running` aborts it.
//! Hosts observe frames through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

/// What the host should currently display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFrame {
    status: VerificationStatus,
    /// Animation phase; only meaningful while running.
    phase: bool,
    /// Animation ticks since the last transition.
    ticks: u64,
}

impl StatusFrame {
    fn at(status: VerificationStatus) -> Self {
        Self {
            status,
            phase: false,
            ticks: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self.status {
            VerificationStatus::Idle => "Hypra: Ready. Save a .hhl file to verify.".to_string(),
            VerificationStatus::Running => format!(
                "Hypra: Verification is running {}",
                if self.phase { '-' } else { '|' }
            ),
            VerificationStatus::Success => "Hypra: Verification successful!".to_string(),
            VerificationStatus::Failed => "Hypra: Verification failed! Run again to retry.".to_string(),
        }
    }
}

pub struct StatusIndicator {
    frames: Arc<watch::Sender<StatusFrame>>,
    ticker: Option<JoinHandle<()>>,
}

impl StatusIndicator {
    #[must_use]
    pub fn new() -> Self {
        let (frames, _) = watch::channel(StatusFrame::default());
        Self {
            frames: Arc::new(frames),
            ticker: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        self.frames.borrow().status
    }

    #[must_use]
    pub fn frame(&self) -> StatusFrame {
        *self.frames.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusFrame> {
        self.frames.subscribe()
    }

    /// Whether the running animation task is alive.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.ticker.as_ref().is_some_and(|ticker| !ticker.is_finished())
    }

    /// Enter `Running` from any state, restarting the animation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_running(&mut self) {
        self.stop_ticker();
        self.frames
            .send_replace(StatusFrame::at(VerificationStatus::Running));

        let frames = Arc::clone(&self.frames);
        self.ticker = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(TICK_INTERVAL);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                frames.send_modify(|frame| {
                    if frame.status == VerificationStatus::Running {
                        frame.phase = !frame.phase;
                        frame.ticks += 1;
                    }
                });
            }
        }));
    }

    pub fn set_success(&mut self) {
        self.settle(VerificationStatus::Success);
    }

    pub fn set_failed(&mut self) {
        self.settle(VerificationStatus::Failed);
    }

    pub fn reset(&mut self) {
        self.settle(VerificationStatus::Idle);
    }

    fn settle(&mut self, status: VerificationStatus) {
        self.stop_ticker();
        self.frames.send_replace(StatusFrame::at(status));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StatusIndicator {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let status = StatusIndicator::new();
        assert_eq!(status.status(), VerificationStatus::Idle);
        assert!(!status.is_animating());
        assert_eq!(status.frame().label(), "Hypra: Ready. Save a .hhl file to verify.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_animates() {
        let mut status = StatusIndicator::new();
        status.set_running();
        assert!(status.is_animating());
        assert_eq!(status.frame().label(), "Hypra: Verification is running |");

        tokio::time::sleep(Duration::from_millis(1750)).await;
        let frame = status.frame();
        assert_eq!(frame.ticks(), 3);
        assert_eq!(frame.label(), "Hypra: Verification is running -");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_cancels_ticker() {
        let mut status = StatusIndicator::new();
        status.set_running();
        tokio::time::sleep(Duration::from_millis(600)).await;

        status.set_success();
        assert!(!status.is_animating());
        assert_eq!(status.status(), VerificationStatus::Success);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let frame = status.frame();
        assert_eq!(frame.ticks(), 0);
        assert_eq!(frame.label(), "Hypra: Verification successful!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cancels_ticker() {
        let mut status = StatusIndicator::new();
        status.set_running();
        status.set_failed();
        assert!(!status.is_animating());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(status.frame().ticks(), 0);
        assert_eq!(
            status.frame().label(),
            "Hypra: Verification failed! Run again to retry."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_from_terminal_restarts_animation() {
        let mut status = StatusIndicator::new();
        status.set_running();
        status.set_failed();
        status.set_running();
        assert!(status.is_animating());
        assert_eq!(status.frame().ticks(), 0);

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(status.frame().ticks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_transitions() {
        let mut status = StatusIndicator::new();
        let mut rx = status.subscribe();
        status.set_running();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status(), VerificationStatus::Running);

        status.reset();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().status(), VerificationStatus::Idle);
        assert!(!status.is_animating());
    }
}
