use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alerts::domain::cooldown_ledger::CooldownLedger;
use crate::capture::frame_source::{Clock, FrameSource};
use crate::records::domain::detection_record::DetectionSource;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::shared::settings::CaptureSettings;
use crate::verification::domain::verification_result::VerificationResult;
use crate::verification::verifier::Verifier;

use super::detection_recorder::DetectionRecorder;

/// Receives what the live loop would display.
pub trait FrameObserver {
    /// Called for every frame read, annotated when it went through detection.
    fn on_frame(&mut self, frame: &Frame, detections: &[Detection], fps: f64);

    /// Called after each verification attempt. Default: no-op.
    fn on_verification(&mut self, _result: &VerificationResult) {}
}

/// Observer that ignores everything.
pub struct NullFrameObserver;

impl FrameObserver for NullFrameObserver {
    fn on_frame(&mut self, _frame: &Frame, _detections: &[Detection], _fps: f64) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiveSessionConfig {
    pub enable_detection: bool,
    pub process_every_n_frames: usize,
    pub verification_cooldown: Duration,
    /// Apply the verification cooldown to local devices too, not just streams.
    pub cooldown_all_sources: bool,
    pub max_consecutive_read_failures: u32,
}

impl LiveSessionConfig {
    pub fn from_settings(capture: &CaptureSettings) -> Self {
        Self {
            enable_detection: true,
            process_every_n_frames: capture.process_every_n_frames.max(1),
            verification_cooldown: Duration::from_secs(capture.verification_cooldown_secs),
            cooldown_all_sources: capture.cooldown_all_sources,
            max_consecutive_read_failures: capture.max_consecutive_read_failures.max(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_read: usize,
    pub frames_processed: usize,
    pub verification_attempts: usize,
    pub verified: usize,
    pub rejected: usize,
    pub verification_errors: usize,
    pub records_saved: usize,
    pub alerts_queued: usize,
}

/// The live capture loop: read, detect every Nth frame, verify strong
/// detections, record what was confirmed.
pub struct LiveSession {
    source: FrameSource,
    verifier: Arc<Verifier>,
    recorder: DetectionRecorder,
    config: LiveSessionConfig,
    clock: Clock,
}

impl LiveSession {
    pub fn new(
        source: FrameSource,
        verifier: Arc<Verifier>,
        recorder: DetectionRecorder,
        config: LiveSessionConfig,
    ) -> Self {
        Self {
            source,
            verifier,
            recorder,
            config,
            clock: Box::new(Instant::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs until `running` is cleared, the source ends, or reads keep
    /// failing. The device is released before returning.
    pub fn execute(
        &mut self,
        running: &AtomicBool,
        observer: &mut dyn FrameObserver,
    ) -> Result<SessionSummary, Box<dyn std::error::Error>> {
        if !self.source.start() {
            return Err(format!("could not open {}", self.source.camera()).into());
        }

        let mut summary = SessionSummary::default();
        let mut gate: CooldownLedger<()> = CooldownLedger::new(self.config.verification_cooldown);
        let gated = self.config.cooldown_all_sources || self.source.camera().is_stream();
        let cadence = self.config.process_every_n_frames.max(1);
        let mut consecutive_failures = 0u32;

        while running.load(Ordering::Relaxed) {
            let Some(frame) = self.source.read_frame() else {
                consecutive_failures += 1;
                if consecutive_failures >= self.config.max_consecutive_read_failures {
                    log::error!(
                        "Giving up on {} after {consecutive_failures} failed reads",
                        self.source.camera()
                    );
                    break;
                }
                continue;
            };
            consecutive_failures = 0;
            summary.frames_read += 1;

            let process = self.config.enable_detection && summary.frames_read % cadence == 0;
            if !process {
                observer.on_frame(&frame, &[], self.source.fps());
                continue;
            }

            summary.frames_processed += 1;
            let layer1 = self.verifier.thresholds().layer1;
            let (display, detections) = self.source.process_frame(&frame, true, layer1);

            if self.verifier.should_trigger_snapshot(&detections) {
                let now = (self.clock)();
                if !gated || gate.is_ready(&(), now) {
                    gate.record((), now);
                    self.attempt_verification(&frame, &mut summary, observer);
                } else {
                    log::debug!("Verification cooling down for {}", self.source.camera());
                }
            }

            observer.on_frame(&display, &detections, self.source.fps());
        }

        self.source.stop();
        log::info!(
            "Session ended: {} frames, {} verified, {} rejected",
            summary.frames_read,
            summary.verified,
            summary.rejected
        );
        Ok(summary)
    }

    fn attempt_verification(
        &self,
        frame: &Frame,
        summary: &mut SessionSummary,
        observer: &mut dyn FrameObserver,
    ) {
        summary.verification_attempts += 1;
        let result = match self.verifier.verify(frame) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Verification aborted: {e}");
                summary.verification_errors += 1;
                return;
            }
        };

        if result.is_verified() {
            summary.verified += 1;
            let outcome = self.recorder.record(&result, DetectionSource::Webcam);
            summary.records_saved += outcome.records_saved;
            summary.alerts_queued += outcome.alerts_queued;
        } else {
            summary.rejected += 1;
        }
        observer.on_verification(&result);
    }
}
