//! Detection loop
//!
//! One iteration: pull the newest frame, analyze it, update the detection
//! rate, keep the recalibration timer in step with the safe zone, evaluate
//! the alert state machine, drive the outputs, publish status, and sample
//! the controls for the next iteration.

use crate::status::MonitorStatus;
use alerting::{
    AlertInputs, AlertOutputs, AlertStateMachine, DigitalIo, InputSampler, InputSnapshot,
    OutputLine,
};
use camera_capture::{RateEstimator, VideoFrame};
use dms::{DmsAnalysis, DmsModule};
use frame_channel::FrameReceiver;
use metrics::{counter, gauge};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of one processed frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub analysis: DmsAnalysis,
    pub outputs: AlertOutputs,
}

pub struct Orchestrator<Io: DigitalIo> {
    frames: FrameReceiver<VideoFrame>,
    dms: DmsModule,
    alerts: AlertStateMachine,
    io: Io,
    sampler: InputSampler,
    /// Controls sampled at the end of the previous iteration
    pending_inputs: InputSnapshot,
    rate: RateEstimator,
    status_tx: watch::Sender<MonitorStatus>,
    processed: u64,
}

impl<Io: DigitalIo> Orchestrator<Io> {
    pub fn new(
        frames: FrameReceiver<VideoFrame>,
        dms: DmsModule,
        alerts: AlertStateMachine,
        io: Io,
        status_tx: watch::Sender<MonitorStatus>,
    ) -> Self {
        Self {
            frames,
            dms,
            alerts,
            io,
            sampler: InputSampler::default(),
            pending_inputs: InputSnapshot::default(),
            rate: RateEstimator::default(),
            status_tx,
            processed: 0,
        }
    }

    /// Run forever on the calling thread
    pub fn run(mut self) {
        info!("Detection loop started");
        loop {
            let frame = self.frames.pull();
            self.process_frame(&frame, Instant::now());
        }
    }

    /// Process one frame. Returns `None` when analysis failed; the safe
    /// zone, alert state and outputs then stay as they were.
    pub fn process_frame(&mut self, frame: &VideoFrame, now: Instant) -> Option<FrameOutcome> {
        let outcome = self.evaluate(frame, now);
        self.pending_inputs = self.sampler.sample(&mut self.io);
        outcome
    }

    fn evaluate(&mut self, frame: &VideoFrame, now: Instant) -> Option<FrameOutcome> {
        let inputs = std::mem::take(&mut self.pending_inputs);
        if self.alerts.apply_inputs(&inputs) {
            self.dms.request_recalibration();
        }
        if self.alerts.recalibration_due(now) {
            self.dms.request_recalibration();
        }

        let analysis = match self.dms.analyze(frame) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Skipping frame {}: {}", frame.sequence, e);
                counter!("attention_frames_failed_total").increment(1);
                return None;
            }
        };

        let fps = self.rate.observe(now);

        if let Some(event) = analysis.calibration_event {
            debug!("Safe zone {:?} on frame {}", event, frame.sequence);
            self.alerts.restart_recalibration_timer(now);
            counter!("attention_recalibrations_total").increment(1);
        }

        let outputs = self.alerts.update(
            AlertInputs {
                face_detected: analysis.face_detected,
                out_of_bound: analysis.out_of_bound,
                eyes_detected: analysis.eyes_visible(),
                turn_signal_active: inputs.turn_signal_active(),
            },
            now,
        );

        self.io.write_output(OutputLine::Buzzer, outputs.buzzer);
        self.io.write_output(OutputLine::Presence, outputs.presence);

        self.processed += 1;
        self.publish(frame, &analysis, &outputs, fps, now);

        Some(FrameOutcome { analysis, outputs })
    }

    fn publish(
        &self,
        frame: &VideoFrame,
        analysis: &DmsAnalysis,
        outputs: &AlertOutputs,
        fps: f32,
        now: Instant,
    ) {
        let channel = self.frames.stats();
        let alarm_ms = self
            .alerts
            .alarm_since()
            .map(|since| now.saturating_duration_since(since).as_millis() as u64);

        self.status_tx.send_replace(MonitorStatus {
            sequence: frame.sequence,
            frames_processed: self.processed,
            face: analysis.face_bbox,
            safe_zone: analysis.safe_zone.calibrated_rect().copied(),
            out_of_bound: analysis.out_of_bound,
            eyes_detected: analysis.eyes_detected,
            detection_fps: fps,
            drop_ratio: channel.drop_ratio(),
            alarm: outputs.alarm,
            alarm_ms,
            buzzer: outputs.buzzer,
            muted: self.alerts.is_muted(),
        });

        counter!("attention_frames_processed_total").increment(1);
        counter!("attention_frames_pushed_total").absolute(channel.pushed as u64);
        counter!("attention_frames_coalesced_total").absolute(channel.replaced as u64);
        counter!("attention_alarm_episodes_total").absolute(self.alerts.episodes());
        gauge!("attention_detection_fps").set(fps as f64);
        gauge!("attention_buzzer").set(if outputs.buzzer { 1.0 } else { 0.0 });
    }

    pub fn dms(&self) -> &DmsModule {
        &self.dms
    }

    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    pub fn frames_processed(&self) -> u64 {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::SimulatedGpio;
    use alerting::{AlertConfig, InputLine};
    use dms::{CalibrationEvent, Detector, DmsConfig, DmsError, Rect};
    use image::GrayImage;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Detector returning queued results, then nothing
    #[derive(Clone, Default)]
    struct Scripted(Arc<Mutex<VecDeque<Result<Vec<Rect>, String>>>>);

    impl Scripted {
        fn push(&self, result: Result<Vec<Rect>, String>) {
            self.0.lock().unwrap().push_back(result);
        }

        fn face(&self, rect: Rect) {
            self.push(Ok(vec![rect]));
        }

        fn none(&self) {
            self.push(Ok(vec![]));
        }
    }

    impl Detector for Scripted {
        fn detect(&mut self, _image: &GrayImage) -> Result<Vec<Rect>, DmsError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(vec![]))
                .map_err(DmsError::Inference)
        }
    }

    struct Rig {
        orchestrator: Orchestrator<SimulatedGpio>,
        faces: Scripted,
        eyes: Scripted,
        gpio: SimulatedGpio,
        status: watch::Receiver<MonitorStatus>,
        t0: Instant,
        sequence: u32,
    }

    impl Rig {
        fn new(samples: usize) -> Self {
            let (faces, eyes) = (Scripted::default(), Scripted::default());
            let dms = DmsModule::with_detectors(
                DmsConfig {
                    calibration_samples: samples,
                    equalize: false,
                    ..Default::default()
                },
                Box::new(faces.clone()),
                Box::new(eyes.clone()),
            );
            let alerts = AlertStateMachine::new(AlertConfig::default()).unwrap();
            let gpio = SimulatedGpio::default();
            let (_tx, frames) = frame_channel::channel();
            let (status_tx, status) = watch::channel(MonitorStatus::default());

            Self {
                orchestrator: Orchestrator::new(frames, dms, alerts, gpio.clone(), status_tx),
                faces,
                eyes,
                gpio,
                status,
                t0: Instant::now(),
                sequence: 0,
            }
        }

        /// Process a frame `ms` milliseconds after the rig was created
        fn step(&mut self, ms: u64) -> Option<FrameOutcome> {
            self.sequence += 1;
            let now = self.t0 + Duration::from_millis(ms);
            let frame = VideoFrame::new(vec![0; 320 * 180], 320, 180, now, self.sequence);
            self.orchestrator.process_frame(&frame, now)
        }

        fn zone(&self) -> Option<Rect> {
            self.orchestrator.dms().safe_zone().calibrated_rect().copied()
        }
    }

    fn centered() -> Rect {
        Rect::new(100, 100, 200, 200)
    }

    #[test]
    fn test_attentive_driver_then_absent() {
        let mut rig = Rig::new(2);
        rig.faces.face(centered());
        rig.faces.face(centered());
        rig.eyes.push(Ok(vec![Rect::new(10, 10, 30, 30)]));
        rig.eyes.push(Ok(vec![Rect::new(10, 10, 30, 30)]));

        let first = rig.step(0).unwrap();
        assert!(!first.outputs.buzzer);
        assert!(rig.zone().is_none());

        let second = rig.step(33).unwrap();
        assert_eq!(second.analysis.calibration_event, Some(CalibrationEvent::Averaged));
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));
        assert!(!second.outputs.buzzer);
        assert!(rig.gpio.output(OutputLine::Presence));

        // Driver leaves the seat: no face, buzzer and presence follow at once.
        rig.faces.none();
        let third = rig.step(66).unwrap();
        assert!(third.outputs.buzzer);
        assert!(rig.gpio.output(OutputLine::Buzzer));
        assert!(!rig.gpio.output(OutputLine::Presence));
        assert_eq!(rig.orchestrator.alerts().episodes(), 1);
    }

    #[test]
    fn test_out_of_zone_without_eyes_alarms() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.eyes.push(Ok(vec![Rect::new(10, 10, 30, 30)]));
        rig.step(0).unwrap();

        // Looking away: face shifted out of the zone, no eyes.
        rig.faces.face(Rect::new(40, 100, 200, 200));
        rig.eyes.none();
        let outcome = rig.step(33).unwrap();
        assert!(outcome.analysis.out_of_bound);
        assert!(outcome.outputs.buzzer);

        // Out of zone but eyes visible: no alarm.
        rig.faces.face(Rect::new(40, 100, 200, 200));
        rig.eyes.push(Ok(vec![Rect::new(10, 10, 30, 30)]));
        let outcome = rig.step(66).unwrap();
        assert!(!outcome.outputs.buzzer);
    }

    #[test]
    fn test_gradual_drift_out_of_zone() {
        let mut rig = Rig::new(1);
        let open_eyes = || Ok(vec![Rect::new(10, 10, 30, 30)]);
        rig.faces.face(centered());
        rig.eyes.push(open_eyes());
        rig.step(0).unwrap();
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));

        // Driver leans left a little more each frame; the zone's left edge is 85.
        let mut ms = 0;
        for x in [96, 92, 88, 85] {
            ms += 33;
            rig.faces.face(Rect::new(x, 100, 200, 200));
            rig.eyes.push(open_eyes());
            let outcome = rig.step(ms).unwrap();
            assert!(!outcome.analysis.out_of_bound, "x = {x}");
            assert!(!outcome.outputs.buzzer);
        }

        ms += 33;
        rig.faces.face(Rect::new(84, 100, 200, 200));
        rig.eyes.push(open_eyes());
        let crossed = rig.step(ms).unwrap();
        assert!(crossed.analysis.out_of_bound);
        assert!(!crossed.outputs.alarm);
        assert!(!crossed.outputs.buzzer);

        // Same position with the eyes turned away.
        ms += 33;
        rig.faces.face(Rect::new(84, 100, 200, 200));
        rig.eyes.none();
        let away = rig.step(ms).unwrap();
        assert!(away.analysis.out_of_bound);
        assert!(away.outputs.buzzer);
        assert_eq!(rig.status.borrow().alarm_ms, Some(0));

        rig.faces.face(Rect::new(84, 100, 200, 200));
        rig.eyes.none();
        rig.step(ms + 50).unwrap();
        assert_eq!(rig.status.borrow().alarm_ms, Some(50));
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));
    }

    #[test]
    fn test_forced_recalibration_uses_single_sample() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.step(0).unwrap();
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));

        rig.faces.face(Rect::new(110, 100, 200, 200));
        let before = rig.step(4_900).unwrap();
        assert_eq!(before.analysis.calibration_event, None);
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));

        rig.faces.face(Rect::new(110, 100, 200, 200));
        let due = rig.step(5_000).unwrap();
        assert_eq!(due.analysis.calibration_event, Some(CalibrationEvent::Single));
        assert_eq!(rig.zone(), Some(Rect::new(90, 87, 260, 250)));

        // The timer restarted with the new zone.
        rig.faces.face(centered());
        let after = rig.step(6_000).unwrap();
        assert_eq!(after.analysis.calibration_event, None);
    }

    #[test]
    fn test_forced_recalibration_waits_for_face() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.step(0).unwrap();

        rig.faces.none();
        let empty = rig.step(5_500).unwrap();
        assert_eq!(empty.analysis.calibration_event, None);

        rig.faces.face(centered());
        let next = rig.step(5_533).unwrap();
        assert_eq!(next.analysis.calibration_event, Some(CalibrationEvent::Single));
        assert_eq!(rig.zone(), Some(Rect::new(80, 87, 260, 250)));
    }

    #[test]
    fn test_recalibrate_button() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.step(0).unwrap();

        // Pressed during frame 2, applied on frame 3.
        rig.gpio.set_input(InputLine::Recalibrate, true);
        rig.faces.face(centered());
        assert_eq!(rig.step(33).unwrap().analysis.calibration_event, None);
        rig.gpio.set_input(InputLine::Recalibrate, false);

        rig.faces.face(centered());
        let outcome = rig.step(66).unwrap();
        assert_eq!(outcome.analysis.calibration_event, Some(CalibrationEvent::Single));
    }

    #[test]
    fn test_mute_button_silences_buzzer() {
        let mut rig = Rig::new(1);
        assert!(rig.step(0).unwrap().outputs.buzzer);

        rig.gpio.set_input(InputLine::MuteToggle, true);
        assert!(rig.step(33).unwrap().outputs.buzzer);

        let muted = rig.step(66).unwrap();
        assert!(muted.outputs.alarm);
        assert!(!muted.outputs.buzzer);
        assert!(!rig.gpio.output(OutputLine::Buzzer));
        assert!(rig.status.borrow().muted);

        // Second press unmutes; the alarm is still active.
        rig.gpio.set_input(InputLine::MuteToggle, false);
        rig.step(99).unwrap();
        rig.gpio.set_input(InputLine::MuteToggle, true);
        rig.step(133).unwrap();
        assert!(rig.step(166).unwrap().outputs.buzzer);
    }

    #[test]
    fn test_turn_signal_suppresses_alarm() {
        let mut rig = Rig::new(1);
        rig.gpio.set_input(InputLine::TurnLeft, true);
        rig.step(0).unwrap();

        let signalling = rig.step(33).unwrap();
        assert!(!signalling.outputs.buzzer);
        assert!(!rig.gpio.output(OutputLine::Buzzer));

        rig.gpio.set_input(InputLine::TurnLeft, false);
        rig.step(66).unwrap();
        assert!(rig.step(99).unwrap().outputs.buzzer);
    }

    #[test]
    fn test_detector_failure_keeps_state() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.step(0).unwrap();
        rig.faces.none();
        assert!(rig.step(33).unwrap().outputs.buzzer);

        rig.faces.push(Err("model crashed".to_string()));
        assert!(rig.step(66).is_none());
        assert!(rig.gpio.output(OutputLine::Buzzer));
        assert_eq!(rig.zone(), Some(Rect::new(85, 97, 260, 250)));
        assert_eq!(rig.orchestrator.frames_processed(), 2);
    }

    #[test]
    fn test_status_published() {
        let mut rig = Rig::new(1);
        rig.faces.face(centered());
        rig.step(0).unwrap();

        let status = rig.status.borrow().clone();
        assert_eq!(status.sequence, 1);
        assert_eq!(status.frames_processed, 1);
        assert_eq!(status.face, Some(centered()));
        assert_eq!(status.safe_zone, Some(Rect::new(85, 97, 260, 250)));
        assert!(!status.buzzer);
        assert_eq!(status.alarm_ms, None);
        assert_eq!(status.drop_ratio, 0.0);
    }

    #[test]
    fn test_run_processes_pushed_frames() {
        let (faces, eyes) = (Scripted::default(), Scripted::default());
        let dms = DmsModule::with_detectors(
            DmsConfig {
                calibration_samples: 1,
                equalize: false,
                ..Default::default()
            },
            Box::new(faces),
            Box::new(eyes),
        );
        let alerts = AlertStateMachine::new(AlertConfig::default()).unwrap();
        let (tx, rx) = frame_channel::channel();
        let (status_tx, status) = watch::channel(MonitorStatus::default());
        let orchestrator = Orchestrator::new(rx, dms, alerts, SimulatedGpio::default(), status_tx);

        std::thread::spawn(move || orchestrator.run());
        tx.push(VideoFrame::new(vec![0; 320 * 180], 320, 180, Instant::now(), 7));

        let deadline = Instant::now() + Duration::from_secs(5);
        while status.borrow().sequence != 7 {
            assert!(Instant::now() < deadline, "frame never processed");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(status.borrow().buzzer);
    }
}
