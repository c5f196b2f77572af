//! The authoritative record of where the bot should be connected.
//!
//! A single [`IntentState`] is created at startup and shared by the command
//! handlers, the watchdog, the event reactor and the reconnection policy.
//! `desired_channel` and `manual_leave` only change together through
//! [`IntentState::set_desired`] and [`IntentState::mark_manual_leave`], so a
//! manual leave always implies there is no desired channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voicehold_types::ChannelId;

/// A point-in-time copy of the connection intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intent {
    /// Channel the bot should be in. Set on join, cleared on leave.
    pub desired_channel: Option<ChannelId>,
    /// True right after an explicit leave; suppresses reconnection until the
    /// next join.
    pub manual_leave: bool,
}

impl Intent {
    /// `manual_leave` implies no desired channel.
    pub fn is_consistent(&self) -> bool {
        !self.manual_leave || self.desired_channel.is_none()
    }

    /// The channel recovery should restore, if recovery is wanted at all.
    pub fn reconnect_target(&self) -> Option<ChannelId> {
        if self.manual_leave {
            None
        } else {
            self.desired_channel
        }
    }
}

#[derive(Debug, Default)]
pub struct IntentState {
    intent: Mutex<Intent>,
    reconnect_in_progress: AtomicBool,
}

impl IntentState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Intent> {
        self.intent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Intent {
        *self.lock()
    }

    pub fn desired_channel(&self) -> Option<ChannelId> {
        self.lock().desired_channel
    }

    pub fn manual_leave(&self) -> bool {
        self.lock().manual_leave
    }

    pub fn reconnect_target(&self) -> Option<ChannelId> {
        self.lock().reconnect_target()
    }

    /// Records a join: the bot should be in `channel` from now on.
    pub fn set_desired(&self, channel: ChannelId) {
        let mut intent = self.lock();
        intent.desired_channel = Some(channel);
        intent.manual_leave = false;
    }

    /// Records an explicit leave, disabling every recovery path.
    pub fn mark_manual_leave(&self) {
        let mut intent = self.lock();
        intent.manual_leave = true;
        intent.desired_channel = None;
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_in_progress.load(Ordering::SeqCst)
    }

    /// Claims the reconnection slot.
    ///
    /// The claim is a single compare-and-swap, so two callers racing here can
    /// never both win. Returns `None` when a sequence is already running. The
    /// slot is released when the returned guard drops, on every exit path.
    pub fn try_begin_reconnect(self: &Arc<Self>) -> Option<ReconnectGuard> {
        self.reconnect_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ReconnectGuard {
                state: Arc::clone(self),
            })
    }
}

/// Holds the reconnection slot; dropping it releases the slot.
#[derive(Debug)]
pub struct ReconnectGuard {
    state: Arc<IntentState>,
}

impl Drop for ReconnectGuard {
    fn drop(&mut self) {
        self.state
            .reconnect_in_progress
            .store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_then_leave_keeps_invariant() {
        let state = IntentState::new();
        state.set_desired(ChannelId(5));
        assert!(state.snapshot().is_consistent());
        assert_eq!(state.reconnect_target(), Some(ChannelId(5)));

        state.mark_manual_leave();
        let intent = state.snapshot();
        assert!(intent.is_consistent());
        assert!(intent.manual_leave);
        assert_eq!(intent.desired_channel, None);
        assert_eq!(state.reconnect_target(), None);
    }

    #[test]
    fn join_after_leave_clears_manual_flag() {
        let state = IntentState::new();
        state.mark_manual_leave();
        state.set_desired(ChannelId(9));
        assert!(!state.manual_leave());
        assert_eq!(state.desired_channel(), Some(ChannelId(9)));
    }

    #[test]
    fn interleaved_joins_and_leaves_never_break_invariant() {
        let state = IntentState::new();
        for i in 0..64u64 {
            if i % 3 == 0 {
                state.mark_manual_leave();
            } else {
                state.set_desired(ChannelId(i));
            }
            assert!(state.snapshot().is_consistent(), "broken after step {i}");
        }
    }

    #[test]
    fn reconnect_slot_is_exclusive_and_released_on_drop() {
        let state = Arc::new(IntentState::new());

        let guard = state.try_begin_reconnect().expect("first claim wins");
        assert!(state.is_reconnecting());
        assert!(state.try_begin_reconnect().is_none());

        drop(guard);
        assert!(!state.is_reconnecting());
        assert!(state.try_begin_reconnect().is_some());
    }

    #[test]
    fn reconnect_slot_is_released_when_holder_panics() {
        let state = Arc::new(IntentState::new());
        let claimed = Arc::clone(&state);

        let result = std::panic::catch_unwind(move || {
            let _guard = claimed.try_begin_reconnect().expect("claim");
            panic!("attempt blew up");
        });

        assert!(result.is_err());
        assert!(!state.is_reconnecting());
    }
}
