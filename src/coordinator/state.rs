//! Capture admission state machine.
//!
//! One small state object decides whether a trigger may start a capture.
//! It is owned by the coordinator task and mutated only through
//! [`CaptureState::on_trigger`] / [`CaptureState::on_finished`], which is what
//! keeps the cooldown check atomic across concurrent trigger sources.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
}

/// Outcome of asking the state machine to admit a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Accepted,
    /// A pipeline is already in flight.
    Busy,
    /// Inside the cooldown window of the last accepted capture.
    Cooldown { remaining: Duration },
}

#[derive(Debug)]
pub struct CaptureState {
    phase: Phase,
    cooldown: Duration,
    last_accepted: Option<Instant>,
}

impl CaptureState {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            cooldown,
            last_accepted: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Admit or reject a trigger. Rejected triggers are never queued.
    pub fn on_trigger(&mut self, now: Instant) -> TriggerDecision {
        if self.phase == Phase::Capturing {
            return TriggerDecision::Busy;
        }

        if let Some(last) = self.last_accepted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.cooldown {
                return TriggerDecision::Cooldown {
                    remaining: self.cooldown - elapsed,
                };
            }
        }

        self.phase = Phase::Capturing;
        self.last_accepted = Some(now);
        TriggerDecision::Accepted
    }

    /// The in-flight pipeline ended, successfully or not.
    pub fn on_finished(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_ms(cooldown_ms: u64) -> CaptureState {
        CaptureState::new(Duration::from_millis(cooldown_ms))
    }

    #[test]
    fn first_trigger_is_accepted() {
        let mut state = state_ms(2_000);
        assert_eq!(state.on_trigger(Instant::now()), TriggerDecision::Accepted);
        assert_eq!(state.phase(), Phase::Capturing);
    }

    #[test]
    fn trigger_while_capturing_is_busy() {
        let mut state = state_ms(2_000);
        let now = Instant::now();
        assert_eq!(state.on_trigger(now), TriggerDecision::Accepted);
        assert_eq!(state.on_trigger(now), TriggerDecision::Busy);
    }

    #[test]
    fn second_trigger_within_cooldown_is_rejected() {
        let mut state = state_ms(2_000);
        let start = Instant::now();

        assert_eq!(state.on_trigger(start), TriggerDecision::Accepted);
        state.on_finished();

        // 500ms later: still cooling down, and the rejection reports how long.
        let decision = state.on_trigger(start + Duration::from_millis(500));
        match decision {
            TriggerDecision::Cooldown { remaining } => {
                assert_eq!(remaining, Duration::from_millis(1_500));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn trigger_after_cooldown_is_accepted() {
        let mut state = state_ms(2_000);
        let start = Instant::now();

        assert_eq!(state.on_trigger(start), TriggerDecision::Accepted);
        state.on_finished();

        assert_eq!(
            state.on_trigger(start + Duration::from_millis(2_000)),
            TriggerDecision::Accepted
        );
    }

    #[test]
    fn rejected_triggers_are_not_queued() {
        let mut state = state_ms(2_000);
        let start = Instant::now();

        assert_eq!(state.on_trigger(start), TriggerDecision::Accepted);
        for i in 1..10 {
            let t = start + Duration::from_millis(i * 10);
            assert_eq!(state.on_trigger(t), TriggerDecision::Busy);
        }
        state.on_finished();

        // Only the cooldown governs the next admission; the rejected burst
        // left no pending work behind.
        assert_eq!(state.phase(), Phase::Idle);
        let decision = state.on_trigger(start + Duration::from_millis(100));
        assert!(matches!(decision, TriggerDecision::Cooldown { .. }));
    }

    #[test]
    fn failure_returns_to_idle_and_keeps_cooldown() {
        let mut state = state_ms(1_000);
        let start = Instant::now();

        assert_eq!(state.on_trigger(start), TriggerDecision::Accepted);
        // Pipeline failed; the cooldown still dates from the acceptance.
        state.on_finished();

        assert!(matches!(
            state.on_trigger(start + Duration::from_millis(200)),
            TriggerDecision::Cooldown { .. }
        ));
        assert_eq!(
            state.on_trigger(start + Duration::from_millis(1_200)),
            TriggerDecision::Accepted
        );
    }

    #[test]
    fn zero_cooldown_only_blocks_while_capturing() {
        let mut state = state_ms(0);
        let now = Instant::now();

        assert_eq!(state.on_trigger(now), TriggerDecision::Accepted);
        state.on_finished();
        assert_eq!(state.on_trigger(now), TriggerDecision::Accepted);
    }
}
