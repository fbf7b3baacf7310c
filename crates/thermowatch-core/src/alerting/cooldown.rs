//! Notification cooldown policy

use chrono::{DateTime, Duration, Utc};

/// Minimum spacing between two notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown(Duration);

impl Cooldown {
    /// Cooldown from a (possibly fractional) number of minutes.
    ///
    /// Negative or non-finite values mean no cooldown.
    pub fn from_minutes(minutes: f64) -> Self {
        if !minutes.is_finite() || minutes <= 0.0 {
            return Self(Duration::zero());
        }
        let millis = (minutes * 60_000.0).round();
        Self(Duration::milliseconds(millis.min(i64::MAX as f64) as i64))
    }

    /// Length of the window
    pub fn duration(self) -> Duration {
        self.0
    }
}

/// Where the notifier stands relative to its cooldown window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    /// Nothing has been sent yet
    NeverSent,
    /// A send happened recently; `remaining` is left on the window
    CooldownActive {
        /// Time left before the next send is allowed
        remaining: Duration,
    },
    /// The window has elapsed
    Eligible,
}

impl CooldownState {
    /// Whether a send is allowed in this state
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::NeverSent | Self::Eligible)
    }
}

/// Time of the most recent notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationState {
    last_sent_at: Option<DateTime<Utc>>,
}

impl NotificationState {
    /// Fresh state, nothing sent
    pub fn new() -> Self {
        Self::default()
    }

    /// When the last notification went out
    pub fn last_sent_at(&self) -> Option<DateTime<Utc>> {
        self.last_sent_at
    }

    /// Evaluate the window at `now`.
    ///
    /// Elapsed time is wall-clock; if the clock stepped backwards past the
    /// last send the window is treated as still active.
    pub fn state_at(&self, now: DateTime<Utc>, cooldown: Cooldown) -> CooldownState {
        let Some(last) = self.last_sent_at else {
            return CooldownState::NeverSent;
        };

        let elapsed = now - last;
        if elapsed >= cooldown.duration() {
            CooldownState::Eligible
        } else {
            // Saturates when a huge window meets a clock stepped far back.
            let remaining = cooldown
                .duration()
                .checked_sub(&elapsed)
                .unwrap_or_else(|| cooldown.duration());
            CooldownState::CooldownActive { remaining }
        }
    }

    /// Shorthand for `state_at(..).is_eligible()`
    pub fn should_send(&self, now: DateTime<Utc>, cooldown: Cooldown) -> bool {
        self.state_at(now, cooldown).is_eligible()
    }

    /// Mark a send at `at`. Never moves `last_sent_at` backwards.
    pub fn record_send(&mut self, at: DateTime<Utc>) {
        self.last_sent_at = Some(match self.last_sent_at {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_never_sent_is_eligible() {
        let state = NotificationState::new();
        assert_eq!(state.state_at(t0(), Cooldown::from_minutes(30.0)), CooldownState::NeverSent);
        assert!(state.should_send(t0(), Cooldown::from_minutes(30.0)));
    }

    #[test]
    fn test_cooldown_scenario() {
        let cooldown = Cooldown::from_minutes(30.0);
        let mut state = NotificationState::new();

        state.record_send(t0());

        let at_10 = t0() + Duration::minutes(10);
        assert_eq!(
            state.state_at(at_10, cooldown),
            CooldownState::CooldownActive {
                remaining: Duration::minutes(20)
            }
        );

        assert_eq!(state.state_at(t0() + Duration::minutes(30), cooldown), CooldownState::Eligible);
        assert!(state.should_send(t0() + Duration::minutes(31), cooldown));
    }

    #[test]
    fn test_fractional_minutes() {
        assert_eq!(Cooldown::from_minutes(0.5).duration(), Duration::seconds(30));
        assert_eq!(Cooldown::from_minutes(-3.0).duration(), Duration::zero());
        assert_eq!(Cooldown::from_minutes(f64::NAN).duration(), Duration::zero());
    }

    #[test]
    fn test_zero_cooldown_always_eligible() {
        let mut state = NotificationState::new();
        state.record_send(t0());
        assert!(state.should_send(t0(), Cooldown::from_minutes(0.0)));
    }

    #[test]
    fn test_clock_stepping_back_keeps_window_active() {
        let mut state = NotificationState::new();
        state.record_send(t0());

        let earlier = t0() - Duration::minutes(5);
        assert!(!state.should_send(earlier, Cooldown::from_minutes(30.0)));

        state.record_send(earlier);
        assert_eq!(state.last_sent_at(), Some(t0()));
    }

    #[test]
    fn test_unbounded_cooldown_with_clock_stepping_back() {
        let mut state = NotificationState::new();
        state.record_send(t0());

        let cooldown = Cooldown::from_minutes(1e300);
        let earlier = t0() - Duration::minutes(5);
        match state.state_at(earlier, cooldown) {
            CooldownState::CooldownActive { remaining } => {
                assert_eq!(remaining, cooldown.duration());
            }
            other => panic!("expected an active window, got {other:?}"),
        }
        assert!(!state.should_send(t0() + Duration::days(365), cooldown));
    }

    proptest! {
        /// Driving the policy with arbitrary call times never yields two sends
        /// closer together than the cooldown.
        #[test]
        fn prop_sends_respect_cooldown(
            cooldown_mins in 0u32..120,
            gaps in proptest::collection::vec(0i64..7200, 1..64),
        ) {
            let cooldown = Cooldown::from_minutes(f64::from(cooldown_mins));
            let mut state = NotificationState::new();
            let mut now = t0();
            let mut sends = Vec::new();

            for gap in gaps {
                now += Duration::seconds(gap);
                if state.should_send(now, cooldown) {
                    state.record_send(now);
                    sends.push(now);
                }
            }

            prop_assert!(!sends.is_empty());
            for pair in sends.windows(2) {
                prop_assert!(pair[1] - pair[0] >= cooldown.duration());
            }
        }

        #[test]
        fn prop_last_sent_is_monotonic(offsets in proptest::collection::vec(-3600i64..3600, 1..32)) {
            let mut state = NotificationState::new();
            let mut high_water: Option<DateTime<Utc>> = None;

            for offset in offsets {
                let at = t0() + Duration::seconds(offset);
                state.record_send(at);
                high_water = Some(high_water.map_or(at, |h| h.max(at)));
                prop_assert_eq!(state.last_sent_at(), high_water);
            }
        }
    }
}
