pub const YOLO_MODEL_NAME: &str = "wildvision_yolov8n.onnx";

/// Inference resolution the model was trained at; used when the exported
/// model has a dynamic input shape.
pub const DEFAULT_INFERENCE_SIZE: u32 = 416;

pub const DEFAULT_LAYER1_CONFIDENCE: f64 = 0.50;
pub const DEFAULT_LAYER2_CONFIDENCE: f64 = 0.40;
pub const DEFAULT_AUTO_SNAPSHOT_THRESHOLD: f64 = 0.75;

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_CAPTURE_FPS: u32 = 30;
pub const DEFAULT_PROCESS_EVERY_N_FRAMES: usize = 2;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Minimum gap between verification attempts on stream sources.
pub const DEFAULT_VERIFICATION_COOLDOWN_SECS: u64 = 5;
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 5;

pub const DEFAULT_LOCATION: &str = "15.880444°N, 74.518389°E";
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Frames between FPS samples.
pub const FPS_SAMPLE_WINDOW: u64 = 10;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
