//! Attention alert state machine

use crate::io::InputSnapshot;
use crate::timer::Timer;
use crate::AlertError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// How long the alarm condition must hold before the buzzer sounds
    pub alarm_delay_ms: u64,
    /// Forced recalibration period, counted from the last calibration
    pub recalibration_interval_ms: u64,
    /// Mute button also requests a recalibration
    pub mute_requests_recalibration: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alarm_delay_ms: 0,
            recalibration_interval_ms: 5000,
            mute_requests_recalibration: false,
        }
    }
}

impl AlertConfig {
    /// Reject settings the state machine cannot run with
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.recalibration_interval_ms == 0 {
            return Err(AlertError::Config(
                "recalibration_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Minimum alarm duration before the buzzer sounds
    pub fn alarm_delay(&self) -> Duration {
        Duration::from_millis(self.alarm_delay_ms)
    }

    /// Period between forced recalibrations
    pub fn recalibration_interval(&self) -> Duration {
        Duration::from_millis(self.recalibration_interval_ms)
    }
}

/// Per-frame detection results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertInputs {
    /// A face was found in this frame
    pub face_detected: bool,
    /// The face lies outside the calibrated safe zone
    pub out_of_bound: bool,
    /// Eye detection ran and found at least one eye
    pub eyes_detected: bool,
    /// Either turn signal is on
    pub turn_signal_active: bool,
}

impl AlertInputs {
    /// Driver absent, or out of the safe zone with no eyes visible
    pub fn attention_lost(&self) -> bool {
        !self.face_detected || (self.out_of_bound && !self.eyes_detected)
    }

    /// Attention lost while no turn signal is active
    pub fn alarm_condition(&self) -> bool {
        !self.turn_signal_active && self.attention_lost()
    }
}

/// Physical outputs for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertOutputs {
    /// Buzzer level
    pub buzzer: bool,
    /// Presence indicator level, mirrors face detection
    pub presence: bool,
    /// Alarm condition, before mute
    pub alarm: bool,
}

/// Mutable alert state, created once at startup
#[derive(Debug, Clone, Default)]
struct AlertState {
    /// Buzzer held low while set
    muted: bool,
    /// Running while the alarm condition has held continuously
    alarm: Timer,
    /// Running since the last calibration
    recalibration: Timer,
}

/// Attention alert state machine: `Idle` while the alarm timer is unset,
/// `Alarming` while it runs. Mute gates the buzzer only.
pub struct AlertStateMachine {
    config: AlertConfig,
    state: AlertState,
    /// Alarm episodes raised so far
    episodes: u64,
}

impl AlertStateMachine {
    /// Create a state machine, idle and unmuted
    pub fn new(config: AlertConfig) -> Result<Self, AlertError> {
        config.validate()?;
        info!(
            "Creating alert state machine (delay {} ms, recalibration every {} ms)",
            config.alarm_delay_ms, config.recalibration_interval_ms
        );
        Ok(Self {
            config,
            state: AlertState::default(),
            episodes: 0,
        })
    }

    /// Evaluate one frame.
    ///
    /// The alarm timer follows the alarm condition, turn signal included;
    /// mute only holds the buzzer low, so unmuting while the alarm is still
    /// active re-asserts the buzzer on the next frame.
    pub fn update(&mut self, inputs: AlertInputs, now: Instant) -> AlertOutputs {
        let alarm = inputs.alarm_condition();

        if alarm {
            if self.state.alarm.start_if_idle(now) {
                self.episodes += 1;
                info!(
                    "Attention lost (face: {}, out of bound: {}, eyes: {})",
                    inputs.face_detected, inputs.out_of_bound, inputs.eyes_detected
                );
            }
        } else if let Some(duration) = self.state.alarm.elapsed(now) {
            info!("Alarm cleared after {:?}", duration);
            self.state.alarm.reset();
        }

        let debounced = self.state.alarm.has_elapsed(now, self.config.alarm_delay());
        let buzzer = alarm && debounced && !self.state.muted;

        if alarm && !buzzer {
            debug!(
                "Buzzer held low (muted: {}, debounced: {})",
                self.state.muted, debounced
            );
        }

        AlertOutputs {
            buzzer,
            presence: inputs.face_detected,
            alarm,
        }
    }

    /// Apply sampled control edges. Returns `true` if a recalibration
    /// was requested.
    pub fn apply_inputs(&mut self, snapshot: &InputSnapshot) -> bool {
        if snapshot.mute_toggled {
            self.toggle_mute();
        }
        let requested = snapshot.recalibrate_requested
            || (snapshot.mute_toggled && self.config.mute_requests_recalibration);
        if requested {
            info!("Manual recalibration requested");
        }
        requested
    }

    /// Flip the buzzer mute
    pub fn toggle_mute(&mut self) {
        self.state.muted = !self.state.muted;
        info!("Buzzer {}", if self.state.muted { "muted" } else { "unmuted" });
    }

    /// Check whether the buzzer is muted
    pub fn is_muted(&self) -> bool {
        self.state.muted
    }

    /// Start of the current alarm episode, `None` while idle
    pub fn alarm_since(&self) -> Option<Instant> {
        self.state.alarm.started_at()
    }

    /// Alarm episodes raised since startup
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// A forced recalibration is due; never before the first calibration
    pub fn recalibration_due(&self, now: Instant) -> bool {
        self.state
            .recalibration
            .has_elapsed(now, self.config.recalibration_interval())
    }

    /// Called whenever the safe zone is (re)calibrated
    pub fn restart_recalibration_timer(&mut self, now: Instant) {
        self.state.recalibration.start(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn machine() -> AlertStateMachine {
        AlertStateMachine::new(AlertConfig::default()).unwrap()
    }

    fn inputs(face: bool, oob: bool, eyes: bool, turn: bool) -> AlertInputs {
        AlertInputs {
            face_detected: face,
            out_of_bound: oob,
            eyes_detected: eyes,
            turn_signal_active: turn,
        }
    }

    #[test]
    fn test_alarm_truth_table() {
        let t0 = Instant::now();
        for bits in 0..16u8 {
            let (face, oob, eyes, turn) =
                (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0);
            let expected = !turn && (!face || (oob && !eyes));

            let mut m = machine();
            let out = m.update(inputs(face, oob, eyes, turn), t0);
            assert_eq!(out.alarm, expected, "bits {:04b}", bits);
            assert_eq!(out.buzzer, expected, "bits {:04b}", bits);
            assert_eq!(out.presence, face);
        }
    }

    #[test]
    fn test_no_face_alarms_immediately() {
        let mut m = machine();
        let out = m.update(inputs(false, false, false, false), Instant::now());
        assert!(out.buzzer);
        assert!(!out.presence);
        assert!(m.alarm_since().is_some());
        assert_eq!(m.episodes(), 1);
    }

    #[test]
    fn test_turn_signal_suppresses_buzzer() {
        let mut m = machine();
        let t0 = Instant::now();
        for face in [false, true] {
            let out = m.update(inputs(face, true, false, true), t0);
            assert!(!out.buzzer);
            assert!(!out.alarm);
        }
    }

    #[test]
    fn test_mute_gates_buzzer_not_alarm() {
        let mut m = machine();
        let t0 = Instant::now();
        m.toggle_mute();

        let out = m.update(inputs(false, false, false, false), t0);
        assert!(out.alarm);
        assert!(!out.buzzer);
        assert_eq!(m.alarm_since(), Some(t0));

        // Unmuting while still alarming re-asserts on the next frame.
        m.toggle_mute();
        let out = m.update(inputs(false, false, false, false), t0 + Duration::from_millis(33));
        assert!(out.buzzer);
        assert_eq!(m.alarm_since(), Some(t0));
        assert_eq!(m.episodes(), 1);
    }

    #[test]
    fn test_condition_clears_alarm() {
        let mut m = machine();
        let t0 = Instant::now();
        m.update(inputs(false, false, false, false), t0);

        let out = m.update(inputs(true, false, false, false), t0 + Duration::from_millis(33));
        assert!(!out.buzzer);
        assert_eq!(m.alarm_since(), None);
    }

    #[test]
    fn test_alarm_delay() {
        let config = AlertConfig {
            alarm_delay_ms: 500,
            ..Default::default()
        };
        let mut m = AlertStateMachine::new(config).unwrap();
        let t0 = Instant::now();
        let lost = inputs(true, true, false, false);

        assert!(!m.update(lost, t0).buzzer);
        assert!(!m.update(lost, t0 + Duration::from_millis(499)).buzzer);
        assert!(m.update(lost, t0 + Duration::from_millis(500)).buzzer);

        // A single attentive frame restarts the delay.
        m.update(inputs(true, false, false, false), t0 + Duration::from_millis(533));
        assert!(!m.update(lost, t0 + Duration::from_millis(566)).buzzer);
    }

    #[test]
    fn test_turn_signal_clears_alarm_timer() {
        let mut m = machine();
        let t0 = Instant::now();

        for i in 0..2 {
            let out = m.update(inputs(false, false, false, true), t0 + Duration::from_millis(33 * i));
            assert!(!out.alarm);
            assert!(!out.buzzer);
        }
        assert_eq!(m.alarm_since(), None);
        assert_eq!(m.episodes(), 0);
    }

    #[test]
    fn test_turn_signal_end_restarts_delay() {
        let config = AlertConfig {
            alarm_delay_ms: 500,
            ..Default::default()
        };
        let mut m = AlertStateMachine::new(config).unwrap();
        let t0 = Instant::now();

        assert!(!m.update(inputs(false, false, false, true), t0).buzzer);
        assert!(!m.update(inputs(false, false, false, true), t0 + Duration::from_secs(1)).buzzer);

        let t1 = t0 + Duration::from_millis(1033);
        assert!(!m.update(inputs(false, false, false, false), t1).buzzer);
        assert_eq!(m.alarm_since(), Some(t1));
        assert!(!m.update(inputs(false, false, false, false), t1 + Duration::from_millis(499)).buzzer);
        assert!(m.update(inputs(false, false, false, false), t1 + Duration::from_millis(500)).buzzer);
        assert_eq!(m.episodes(), 1);
    }

    #[test]
    fn test_mute_edge_toggles() {
        let mut m = machine();
        let edge = InputSnapshot {
            mute_toggled: true,
            ..Default::default()
        };

        assert!(!m.apply_inputs(&edge));
        assert!(m.is_muted());
        assert!(!m.apply_inputs(&InputSnapshot::default()));
        assert!(m.is_muted());
        m.apply_inputs(&edge);
        assert!(!m.is_muted());
    }

    #[test]
    fn test_mute_can_request_recalibration() {
        let config = AlertConfig {
            mute_requests_recalibration: true,
            ..Default::default()
        };
        let mut m = AlertStateMachine::new(config).unwrap();
        let edge = InputSnapshot {
            mute_toggled: true,
            ..Default::default()
        };
        assert!(m.apply_inputs(&edge));
        assert!(m.is_muted());
    }

    #[test]
    fn test_recalibrate_edge() {
        let mut m = machine();
        let edge = InputSnapshot {
            recalibrate_requested: true,
            ..Default::default()
        };
        assert!(m.apply_inputs(&edge));
        assert!(!m.is_muted());
    }

    #[test]
    fn test_recalibration_timer() {
        let mut m = machine();
        let t0 = Instant::now();

        assert!(!m.recalibration_due(t0 + Duration::from_secs(60)));

        m.restart_recalibration_timer(t0);
        assert!(!m.recalibration_due(t0 + Duration::from_millis(4999)));
        assert!(m.recalibration_due(t0 + Duration::from_secs(5)));

        m.restart_recalibration_timer(t0 + Duration::from_secs(5));
        assert!(!m.recalibration_due(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_invalid_config() {
        let config = AlertConfig {
            recalibration_interval_ms: 0,
            ..Default::default()
        };
        assert!(AlertStateMachine::new(config).is_err());
    }

    proptest! {
        #[test]
        fn prop_buzzer_never_sounds_when_gated(
            frames in proptest::collection::vec(any::<(bool, bool, bool, bool, bool)>(), 1..100)
        ) {
            let mut m = machine();
            let t0 = Instant::now();
            for (i, (face, oob, eyes, turn, mute)) in frames.into_iter().enumerate() {
                if mute {
                    m.toggle_mute();
                }
                let out = m.update(inputs(face, oob, eyes, turn), t0 + Duration::from_millis(33 * i as u64));
                if turn || m.is_muted() {
                    prop_assert!(!out.buzzer);
                }
                prop_assert_eq!(out.presence, face);
                prop_assert_eq!(m.alarm_since().is_some(), !turn && (!face || (oob && !eyes)));
            }
        }
    }
}
