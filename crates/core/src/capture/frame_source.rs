use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::infrastructure::box_renderer::BoxRenderer;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::domain::camera_id::CameraId;
use super::domain::capture_device::{CaptureDevice, CaptureRequest};
use super::domain::fps_meter::FpsMeter;

pub type Clock = Box<dyn Fn() -> Instant + Send>;

/// Owns the lifecycle of one live capture handle.
///
/// The caller running the capture loop is the only mutator. Reads are
/// pull-based and never retried here: a failed read is reported as `None`
/// and the caller decides whether to keep going.
pub struct FrameSource {
    camera: CameraId,
    request: CaptureRequest,
    device: Box<dyn CaptureDevice>,
    detector: Arc<dyn ObjectDetector>,
    renderer: Arc<BoxRenderer>,
    running: bool,
    frame_counter: u64,
    fps: FpsMeter,
    clock: Clock,
}

impl FrameSource {
    pub fn new(
        camera: CameraId,
        request: CaptureRequest,
        device: Box<dyn CaptureDevice>,
        detector: Arc<dyn ObjectDetector>,
    ) -> Self {
        Self {
            camera,
            request,
            device,
            detector,
            renderer: Arc::new(BoxRenderer::new()),
            running: false,
            frame_counter: 0,
            fps: FpsMeter::default(),
            clock: Box::new(Instant::now),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<BoxRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn camera(&self) -> &CameraId {
        &self.camera
    }

    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return true;
        }
        match self.device.open(&self.camera, &self.request) {
            Ok(()) => {
                self.running = true;
                self.frame_counter = 0;
                self.fps.reset((self.clock)());
                log::info!("Started capture from {}", self.camera);
                true
            }
            Err(e) => {
                log::warn!("Could not start capture: {e}");
                self.device.release();
                self.running = false;
                false
            }
        }
    }

    pub fn stop(&mut self) {
        let was_running = self.running;
        self.running = false;
        self.device.release();
        if was_running {
            log::info!(
                "Stopped capture from {} after {} frames",
                self.camera,
                self.frame_counter
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.running && self.device.is_open()
    }

    /// Next frame, or `None` on a failed read or when not running.
    ///
    /// Stream frames larger than the requested capture size are scaled down
    /// to exactly that size so downstream sizing does not depend on the
    /// remote encoder.
    pub fn read_frame(&mut self) -> Option<Frame> {
        if !self.is_running() {
            return None;
        }
        let frame = match self.device.read() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Frame read from {} failed: {e}", self.camera);
                return None;
            }
        };

        let index = self.frame_counter as usize;
        self.frame_counter += 1;
        self.fps.tick((self.clock)());

        Some(self.normalize(frame).with_index(index))
    }

    pub fn fps(&self) -> f64 {
        self.fps.fps()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Runs the detector and draws its boxes.
    ///
    /// Never fails: disabled detection, an unavailable model, or an error on
    /// this frame all yield an unmodified copy and no detections.
    pub fn process_frame(
        &self,
        frame: &Frame,
        enable_detection: bool,
        confidence: f64,
    ) -> (Frame, Vec<Detection>) {
        if !enable_detection || !self.detector.is_available() {
            return (frame.clone(), Vec::new());
        }
        match self.detector.detect(frame, confidence) {
            Ok(detections) => {
                let annotated = self.renderer.draw_boxes(frame, &detections);
                (annotated, detections)
            }
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                (frame.clone(), Vec::new())
            }
        }
    }

    fn normalize(&self, frame: Frame) -> Frame {
        let (target_w, target_h) = (self.request.width, self.request.height);
        let oversized = frame.width() > target_w || frame.height() > target_h;
        if !self.camera.is_stream() || !oversized {
            return frame;
        }
        match frame.resized(target_w, target_h) {
            Some(scaled) => scaled,
            None => {
                log::debug!("Could not downscale stream frame, passing through");
                frame
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::capture_device::CaptureError;
    use crate::detection::domain::object_detector::DetectionError;
    use crate::shared::detection::BoundingBox;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    // --- Stubs ---

    struct StubDevice {
        open_fails: bool,
        open: bool,
        frames: VecDeque<Result<Frame, CaptureError>>,
        releases: Arc<AtomicUsize>,
    }

    impl StubDevice {
        fn new(frames: Vec<Result<Frame, CaptureError>>) -> Self {
            Self {
                open_fails: false,
                open: false,
                frames: frames.into(),
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing() -> Self {
            Self {
                open_fails: true,
                ..Self::new(Vec::new())
            }
        }
    }

    impl CaptureDevice for StubDevice {
        fn open(&mut self, camera: &CameraId, _request: &CaptureRequest) -> Result<(), CaptureError> {
            if self.open_fails {
                return Err(CaptureError::Open {
                    camera: camera.to_string(),
                    reason: "device busy".into(),
                });
            }
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn read(&mut self) -> Result<Frame, CaptureError> {
            self.frames.pop_front().unwrap_or(Err(CaptureError::EndOfStream))
        }

        fn release(&mut self) {
            self.open = false;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubDetector {
        available: bool,
        fail: bool,
        detections: Vec<Detection>,
        called: AtomicBool,
    }

    impl StubDetector {
        fn returning(detections: Vec<Detection>) -> Self {
            Self {
                available: true,
                fail: false,
                detections,
                called: AtomicBool::new(false),
            }
        }
    }

    impl ObjectDetector for StubDetector {
        fn detect(&self, _frame: &Frame, _confidence: f64) -> Result<Vec<Detection>, DetectionError> {
            self.called.store(true, Ordering::SeqCst);
            if self.fail {
                return Err(DetectionError::Inference("boom".into()));
            }
            Ok(self.detections.clone())
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![10u8; (width * height * 3) as usize], width, height, 3, 0)
    }

    fn request() -> CaptureRequest {
        CaptureRequest {
            width: 640,
            height: 480,
            fps: 30,
            read_timeout: Duration::from_secs(5),
        }
    }

    fn source(camera: CameraId, device: StubDevice) -> FrameSource {
        FrameSource::new(
            camera,
            request(),
            Box::new(device),
            Arc::new(StubDetector::returning(Vec::new())),
        )
    }

    #[test]
    fn test_failed_start_is_not_running() {
        let mut src = source(CameraId::Device(0), StubDevice::failing());
        assert!(!src.start());
        assert!(!src.is_running());
        assert!(src.read_frame().is_none());
    }

    #[test]
    fn test_read_failure_keeps_handle_open() {
        let device = StubDevice::new(vec![
            Err(CaptureError::Decode("corrupt packet".into())),
            Ok(frame(8, 8)),
        ]);
        let mut src = source(CameraId::Device(0), device);
        assert!(src.start());
        assert!(src.read_frame().is_none());
        assert!(src.is_running());
        assert!(src.read_frame().is_some());
    }

    #[test]
    fn test_frames_are_indexed_sequentially() {
        let device = StubDevice::new(vec![Ok(frame(4, 4)), Ok(frame(4, 4))]);
        let mut src = source(CameraId::Device(0), device);
        src.start();
        assert_eq!(src.read_frame().unwrap().index(), 0);
        assert_eq!(src.read_frame().unwrap().index(), 1);
        assert_eq!(src.frame_counter(), 2);
    }

    #[test]
    fn test_stop_is_idempotent_and_releases() {
        let device = StubDevice::new(Vec::new());
        let releases = device.releases.clone();
        let mut src = source(CameraId::Device(0), device);
        src.stop();
        src.start();
        src.stop();
        src.stop();
        assert!(!src.is_running());
        assert!(src.read_frame().is_none());
        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_drop_releases_device() {
        let device = StubDevice::new(Vec::new());
        let releases = device.releases.clone();
        {
            let mut src = source(CameraId::Device(0), device);
            src.start();
        }
        assert!(releases.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_stream_frames_are_downscaled() {
        let device = StubDevice::new(vec![Ok(frame(1280, 720))]);
        let mut src = source(CameraId::Stream("rtsp://cam/live".into()), device);
        src.start();
        let f = src.read_frame().unwrap();
        assert_eq!((f.width(), f.height()), (640, 480));
    }

    #[test]
    fn test_small_stream_frames_are_untouched() {
        let device = StubDevice::new(vec![Ok(frame(320, 240))]);
        let mut src = source(CameraId::Stream("rtsp://cam/live".into()), device);
        src.start();
        let f = src.read_frame().unwrap();
        assert_eq!((f.width(), f.height()), (320, 240));
    }

    #[test]
    fn test_device_frames_are_never_resized() {
        let device = StubDevice::new(vec![Ok(frame(1280, 720))]);
        let mut src = source(CameraId::Device(0), device);
        src.start();
        let f = src.read_frame().unwrap();
        assert_eq!((f.width(), f.height()), (1280, 720));
    }

    #[test]
    fn test_fps_after_ten_frames_in_two_seconds() {
        let start = Instant::now();
        let now = Arc::new(Mutex::new(start));
        let clock_now = now.clone();
        let device = StubDevice::new((0..10).map(|_| Ok(frame(4, 4))).collect());
        let mut src = source(CameraId::Device(0), device)
            .with_clock(Box::new(move || *clock_now.lock().unwrap()));

        src.start();
        for i in 1..=10 {
            *now.lock().unwrap() = start + Duration::from_millis(200 * i);
            src.read_frame().unwrap();
        }
        assert_relative_eq!(src.fps(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_process_frame_draws_detections() {
        let det = Detection::new(3, 0.9, BoundingBox::new(1, 1, 7, 7).unwrap());
        let src = FrameSource::new(
            CameraId::Device(0),
            request(),
            Box::new(StubDevice::new(Vec::new())),
            Arc::new(StubDetector::returning(vec![det.clone()])),
        );
        let input = frame(8, 8);
        let (annotated, dets) = src.process_frame(&input, true, 0.5);
        assert_eq!(dets, vec![det]);
        assert_ne!(annotated.data(), input.data());
    }

    #[test]
    fn test_process_frame_disabled_skips_detector() {
        let detector = Arc::new(StubDetector::returning(Vec::new()));
        let src = FrameSource::new(
            CameraId::Device(0),
            request(),
            Box::new(StubDevice::new(Vec::new())),
            detector.clone(),
        );
        let input = frame(8, 8);
        let (out, dets) = src.process_frame(&input, false, 0.5);
        assert_eq!(out, input);
        assert!(dets.is_empty());
        assert!(!detector.called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_process_frame_swallows_detector_errors() {
        let detector = StubDetector {
            fail: true,
            ..StubDetector::returning(Vec::new())
        };
        let src = FrameSource::new(
            CameraId::Device(0),
            request(),
            Box::new(StubDevice::new(Vec::new())),
            Arc::new(detector),
        );
        let input = frame(8, 8);
        let (out, dets) = src.process_frame(&input, true, 0.5);
        assert_eq!(out, input);
        assert!(dets.is_empty());
    }

    #[test]
    fn test_process_frame_with_unavailable_model() {
        let detector = StubDetector {
            available: false,
            ..StubDetector::returning(Vec::new())
        };
        let src = FrameSource::new(
            CameraId::Device(0),
            request(),
            Box::new(StubDevice::new(Vec::new())),
            Arc::new(detector),
        );
        let input = frame(8, 8);
        let (out, dets) = src.process_frame(&input, true, 0.5);
        assert_eq!(out, input);
        assert!(dets.is_empty());
    }
}
