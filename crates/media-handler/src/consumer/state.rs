//! Mutable consumer state and its transition rules.
//!
//! Every method here runs under the consumer's state lock, so each
//! transition is decided and applied in one critical section. Callers emit
//! events only after the lock is released.
//!
//! Pause-related events are queued under the lock in decision order and
//! drained by a single emitter at a time, so listeners on different threads
//! always observe them in the order the transitions happened.

use std::collections::VecDeque;

use media_protocol::consumer::{ConsumerLayers, ConsumerScore, DEFAULT_PRIORITY};

/// Why a consumer was closed. Selects which events fire on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The application called `close()`.
    Explicit,
    /// The worker reported the producer closed.
    ProducerClosed,
    /// The owning transport was closed.
    TransportClosed,
}

impl CloseReason {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CloseReason::Explicit => "explicit",
            CloseReason::ProducerClosed => "producer_closed",
            CloseReason::TransportClosed => "transport_closed",
        }
    }
}

/// Change of the effective pause state caused by one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseChange {
    Unchanged,
    Paused,
    Resumed,
}

/// Pause-related event waiting to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseEvent {
    ProducerPause,
    ProducerResume,
    Pause,
    Resume,
}

#[derive(Debug)]
pub(crate) struct ConsumerState {
    pub(crate) closed: bool,
    /// Owned by local `pause()`/`resume()` calls.
    pub(crate) paused: bool,
    /// Owned by worker notifications.
    pub(crate) producer_paused: bool,
    pub(crate) priority: u32,
    pub(crate) score: ConsumerScore,
    pub(crate) preferred_layers: Option<ConsumerLayers>,
    pub(crate) current_layers: Option<ConsumerLayers>,
    pending_pause_events: VecDeque<PauseEvent>,
    /// Set while some thread is draining `pending_pause_events`.
    emitting: bool,
}

impl ConsumerState {
    pub(crate) fn new(
        paused: bool,
        producer_paused: bool,
        score: Option<ConsumerScore>,
        preferred_layers: Option<ConsumerLayers>,
    ) -> Self {
        Self {
            closed: false,
            paused,
            producer_paused,
            priority: DEFAULT_PRIORITY,
            score: score.unwrap_or_default(),
            preferred_layers,
            current_layers: None,
            pending_pause_events: VecDeque::new(),
            emitting: false,
        }
    }

    pub(crate) fn effectively_paused(&self) -> bool {
        self.paused || self.producer_paused
    }

    /// Flip the closed flag. Returns `true` only for the first caller.
    pub(crate) fn mark_closed(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        true
    }

    pub(crate) fn set_local_paused(&mut self, paused: bool) -> PauseChange {
        let was_paused = self.effectively_paused();
        self.paused = paused;
        self.pause_change(was_paused)
    }

    /// Apply a producer pause/resume notification.
    ///
    /// Returns `None` when the flag already has that value, so redelivered
    /// notifications emit nothing.
    pub(crate) fn set_producer_paused(&mut self, paused: bool) -> Option<PauseChange> {
        if self.producer_paused == paused {
            return None;
        }
        let was_paused = self.effectively_paused();
        self.producer_paused = paused;
        Some(self.pause_change(was_paused))
    }

    pub(crate) fn push_pause_event(&mut self, event: PauseEvent) {
        self.pending_pause_events.push_back(event);
    }

    pub(crate) fn push_pause_change(&mut self, change: PauseChange) {
        match change {
            PauseChange::Paused => self.push_pause_event(PauseEvent::Pause),
            PauseChange::Resumed => self.push_pause_event(PauseEvent::Resume),
            PauseChange::Unchanged => {}
        }
    }

    /// Claim the emitter role.
    ///
    /// Returns `true` if events are queued and no other caller is draining
    /// them. The caller must then drain with [`Self::next_pause_event`] until
    /// it returns `None`.
    pub(crate) fn begin_emitting(&mut self) -> bool {
        if self.emitting || self.pending_pause_events.is_empty() {
            return false;
        }
        self.emitting = true;
        true
    }

    /// Next queued event, releasing the emitter role once the queue is empty.
    /// Events still queued when the consumer closes are discarded.
    pub(crate) fn next_pause_event(&mut self) -> Option<PauseEvent> {
        if self.closed {
            self.pending_pause_events.clear();
        }
        let next = self.pending_pause_events.pop_front();
        if next.is_none() {
            self.emitting = false;
        }
        next
    }

    fn pause_change(&self, was_paused: bool) -> PauseChange {
        match (was_paused, self.effectively_paused()) {
            (false, true) => PauseChange::Paused,
            (true, false) => PauseChange::Resumed,
            _ => PauseChange::Unchanged,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn state(paused: bool, producer_paused: bool) -> ConsumerState {
        ConsumerState::new(paused, producer_paused, None, None)
    }

    #[test]
    fn test_new_applies_defaults() {
        let state = state(false, false);
        assert_eq!(state.priority, 1);
        assert_eq!(state.score, ConsumerScore::default());
        assert!(state.current_layers.is_none());
        assert!(!state.closed);
    }

    #[test]
    fn test_mark_closed_once() {
        let mut state = state(false, false);
        assert!(state.mark_closed());
        assert!(!state.mark_closed());
        assert!(state.closed);
    }

    #[test]
    fn test_local_pause_transitions() {
        let mut state = state(false, false);
        assert_eq!(state.set_local_paused(true), PauseChange::Paused);
        assert_eq!(state.set_local_paused(true), PauseChange::Unchanged);
        assert_eq!(state.set_local_paused(false), PauseChange::Resumed);
    }

    #[test]
    fn test_local_pause_hidden_by_producer_pause() {
        let mut state = state(false, true);
        assert_eq!(state.set_local_paused(true), PauseChange::Unchanged);
        assert_eq!(state.set_local_paused(false), PauseChange::Unchanged);
        assert!(state.effectively_paused());
    }

    #[test]
    fn test_producer_pause_ignores_duplicates() {
        let mut state = state(false, false);
        assert_eq!(state.set_producer_paused(true), Some(PauseChange::Paused));
        assert_eq!(state.set_producer_paused(true), None);
        assert_eq!(state.set_producer_paused(false), Some(PauseChange::Resumed));
        assert_eq!(state.set_producer_paused(false), None);
    }

    #[test]
    fn test_producer_resume_while_locally_paused() {
        let mut state = state(true, true);
        assert_eq!(state.set_producer_paused(false), Some(PauseChange::Unchanged));
        assert!(state.effectively_paused());
    }

    #[test]
    fn test_single_emitter_drains_in_order() {
        let mut state = state(false, true);

        let change = state.set_producer_paused(false).unwrap();
        state.push_pause_event(PauseEvent::ProducerResume);
        state.push_pause_change(change);
        assert!(state.begin_emitting());
        assert_eq!(state.next_pause_event(), Some(PauseEvent::ProducerResume));

        // A second transition while the first emitter is still busy is
        // queued behind it.
        let change = state.set_local_paused(true);
        state.push_pause_change(change);
        assert!(!state.begin_emitting());

        assert_eq!(state.next_pause_event(), Some(PauseEvent::Resume));
        assert_eq!(state.next_pause_event(), Some(PauseEvent::Pause));
        assert_eq!(state.next_pause_event(), None);
        assert!(!state.begin_emitting());
    }

    #[test]
    fn test_unchanged_queues_nothing() {
        let mut state = state(false, true);
        let change = state.set_local_paused(true);
        state.push_pause_change(change);
        assert!(!state.begin_emitting());
    }

    #[test]
    fn test_pending_events_dropped_on_close() {
        let mut state = state(false, false);
        state.push_pause_change(PauseChange::Paused);
        assert!(state.begin_emitting());

        state.mark_closed();
        assert_eq!(state.next_pause_event(), None);
        assert!(!state.begin_emitting());
    }

    #[test]
    fn test_close_reason_labels() {
        assert_eq!(CloseReason::Explicit.as_str(), "explicit");
        assert_eq!(CloseReason::ProducerClosed.as_str(), "producer_closed");
        assert_eq!(CloseReason::TransportClosed.as_str(), "transport_closed");
    }
}
