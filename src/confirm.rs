use std::time::{Duration, Instant};

/// Minimum confidence (0..=100 scale) a prediction must hold to stay tracked.
pub const CONFIDENCE_THRESHOLD: f32 = 90.0;
/// How long one label must hold the threshold before it is confirmed.
pub const CONFIRMATION_WINDOW: Duration = Duration::from_millis(5_000);

#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmationState {
    Idle,
    Tracking { label: String, since: Instant },
    Confirmed { label: String },
}

/// Debounces the per-frame prediction stream into a single confirmed
/// material. A label is confirmed once it has stayed at or above the
/// confidence threshold, uninterrupted, for the whole window. `Confirmed`
/// is absorbing; only `reset` leaves it.
pub struct ConfirmationPolicy {
    threshold: f32,
    window: Duration,
    state: ConfirmationState,
}

impl ConfirmationPolicy {
    pub fn new() -> Self {
        Self::with_params(CONFIDENCE_THRESHOLD, CONFIRMATION_WINDOW)
    }

    pub fn with_params(threshold: f32, window: Duration) -> Self {
        Self {
            threshold,
            window,
            state: ConfirmationState::Idle,
        }
    }

    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }

    pub fn confirmed_label(&self) -> Option<&str> {
        match &self.state {
            ConfirmationState::Confirmed { label } => Some(label),
            _ => None,
        }
    }

    /// Feed one prediction sample. A sample below the threshold drops the
    /// policy back to `Idle`; a new label re-arms the window; a repeat of
    /// the tracked label leaves `since` untouched, the window runs from the
    /// first sighting and never restarts on later samples.
    pub fn observe(&mut self, label: &str, confidence: f32, now: Instant) -> &ConfirmationState {
        if matches!(self.state, ConfirmationState::Confirmed { .. }) {
            return &self.state;
        }

        if confidence < self.threshold {
            self.state = ConfirmationState::Idle;
            return &self.state;
        }

        let tracking_same = matches!(
            &self.state,
            ConfirmationState::Tracking { label: tracked, .. } if tracked == label
        );
        if !tracking_same {
            self.state = ConfirmationState::Tracking {
                label: label.to_owned(),
                since: now,
            };
        }

        self.poll(now)
    }

    /// Promote `Tracking` to `Confirmed` once the window has elapsed, even
    /// if no further sample arrives (the camera may stall while the object
    /// sits still).
    pub fn poll(&mut self, now: Instant) -> &ConfirmationState {
        let expired = match &self.state {
            ConfirmationState::Tracking { label, since }
                if now.duration_since(*since) >= self.window =>
            {
                Some(label.clone())
            }
            _ => None,
        };
        if let Some(label) = expired {
            self.state = ConfirmationState::Confirmed { label };
        }
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = ConfirmationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn starts_idle() {
        let policy = ConfirmationPolicy::new();
        assert_eq!(*policy.state(), ConfirmationState::Idle);
        assert_eq!(policy.confirmed_label(), None);
    }

    #[test]
    fn low_confidence_never_tracks() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        for ms in (0..10_000).step_by(100) {
            policy.observe("METAL", 89.9, at(start, ms));
        }
        assert_eq!(*policy.state(), ConfirmationState::Idle);
    }

    #[test]
    fn threshold_is_inclusive() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("METAL", 90.0, start);
        assert!(matches!(
            policy.state(),
            ConfirmationState::Tracking { label, .. } if label == "METAL"
        ));
    }

    #[test]
    fn no_confirmation_before_the_window_elapses() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        for ms in (0..=4_900).step_by(100) {
            let state = policy.observe("METAL", 95.0, at(start, ms));
            assert!(matches!(state, ConfirmationState::Tracking { .. }));
        }
    }

    #[test]
    fn sustained_label_confirms_at_the_window() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        for ms in (0..5_000).step_by(100) {
            policy.observe("METAL", 95.0, at(start, ms));
        }
        policy.observe("METAL", 95.0, at(start, 5_000));
        assert_eq!(policy.confirmed_label(), Some("METAL"));
    }

    #[test]
    fn repeat_samples_do_not_restart_the_window() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("METAL", 95.0, start);
        // Dense resampling of the same label must not push the deadline out.
        for ms in (100..5_000).step_by(50) {
            policy.observe("METAL", 92.0, at(start, ms));
        }
        let state = policy.observe("METAL", 92.0, at(start, 5_000)).clone();
        assert_eq!(
            state,
            ConfirmationState::Confirmed {
                label: "METAL".into()
            }
        );
    }

    #[test]
    fn label_switch_rearms_the_window() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("PLÁSTICO", 95.0, start);
        policy.observe("PLÁSTICO", 95.0, at(start, 3_000));
        policy.observe("METAL", 95.0, at(start, 3_000));

        // Old window would have expired here; the switch discarded it.
        let state = policy.observe("METAL", 95.0, at(start, 5_500)).clone();
        assert!(matches!(state, ConfirmationState::Tracking { .. }));

        let state = policy.observe("METAL", 95.0, at(start, 8_000)).clone();
        assert_eq!(
            state,
            ConfirmationState::Confirmed {
                label: "METAL".into()
            }
        );
    }

    #[test]
    fn confidence_dip_drops_tracking() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("METAL", 95.0, start);
        policy.observe("METAL", 50.0, at(start, 2_000));
        assert_eq!(*policy.state(), ConfirmationState::Idle);

        // The dip threw the accumulated time away.
        let state = policy.observe("METAL", 95.0, at(start, 3_000)).clone();
        assert!(matches!(
            state,
            ConfirmationState::Tracking { since, .. } if since == at(start, 3_000)
        ));
    }

    #[test]
    fn alternating_labels_never_confirm() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        for i in 0..20 {
            let label = if i % 2 == 0 { "METAL" } else { "PLÁSTICO" };
            let state = policy.observe(label, 95.0, at(start, i * 1_000)).clone();
            assert!(matches!(state, ConfirmationState::Tracking { .. }));
        }
    }

    #[test]
    fn poll_confirms_without_a_new_sample() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("TETRA PAK", 97.0, start);

        assert!(matches!(
            policy.poll(at(start, 4_999)),
            ConfirmationState::Tracking { .. }
        ));
        assert_eq!(
            *policy.poll(at(start, 5_000)),
            ConfirmationState::Confirmed {
                label: "TETRA PAK".into()
            }
        );
    }

    #[test]
    fn confirmed_is_absorbing() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("METAL", 95.0, start);
        policy.poll(at(start, 5_000));
        assert_eq!(policy.confirmed_label(), Some("METAL"));

        policy.observe("PLÁSTICO", 99.0, at(start, 6_000));
        policy.observe("METAL", 10.0, at(start, 7_000));
        assert_eq!(policy.confirmed_label(), Some("METAL"));
    }

    #[test]
    fn custom_parameters_drive_the_same_machine() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::with_params(50.0, Duration::from_millis(200));

        policy.observe("METAL", 49.0, start);
        assert_eq!(*policy.state(), ConfirmationState::Idle);

        policy.observe("METAL", 60.0, at(start, 10));
        assert!(matches!(policy.state(), ConfirmationState::Tracking { .. }));

        policy.observe("METAL", 60.0, at(start, 210));
        assert_eq!(policy.confirmed_label(), Some("METAL"));
    }

    #[test]
    fn reset_returns_to_idle() {
        let start = Instant::now();
        let mut policy = ConfirmationPolicy::new();
        policy.observe("METAL", 95.0, start);
        policy.poll(at(start, 5_000));
        assert_eq!(policy.confirmed_label(), Some("METAL"));

        policy.reset();
        assert_eq!(*policy.state(), ConfirmationState::Idle);
    }
}
