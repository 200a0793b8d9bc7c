//! Typing notifications
//!
//! Outbound: a single-flight guard so keystrokes never stack up concurrent
//! `/typing` requests. Inbound: a transient title that a fixed-interval
//! timer resets to the default, whatever arrived in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anonchat_core::TypingSignal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::SessionUpdate;

/// Title shown when nobody is typing
pub const DEFAULT_TITLE: &str = "AnonChat";

/// Held while a typing submission is outstanding; released on drop, so an
/// error or a dropped future cannot leave the flag set.
pub(crate) struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    /// `None` if another submission already holds the flag
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Transient "<sender> is typing..." title
#[derive(Clone)]
pub struct TypingIndicator {
    current: Arc<Mutex<Option<TypingSignal>>>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl TypingIndicator {
    pub fn new(updates: broadcast::Sender<SessionUpdate>) -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
            updates,
        }
    }

    /// Display `signal` until the next reset tick
    pub fn show(&self, signal: TypingSignal) {
        let title = signal.text.clone();
        *self.lock() = Some(signal);
        let _ = self.updates.send(SessionUpdate::TitleChanged(title));
    }

    /// Back to the default title. Returns whether anything was showing.
    pub fn reset(&self) -> bool {
        let was_showing = self.lock().take().is_some();
        if was_showing {
            let _ = self
                .updates
                .send(SessionUpdate::TitleChanged(DEFAULT_TITLE.to_string()));
        }
        was_showing
    }

    /// Title to display right now
    pub fn title(&self) -> String {
        self.lock()
            .as_ref()
            .map(|s| s.text.clone())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    /// Reset the title every `period`, first tick one period from now
    pub fn spawn_reset_timer(&self, period: Duration) -> JoinHandle<()> {
        let indicator = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if indicator.reset() {
                    debug!("Typing title expired");
                }
            }
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TypingSignal>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
