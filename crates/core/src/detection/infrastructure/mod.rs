pub mod box_renderer;
pub mod execution_provider;
pub mod math;
pub mod model_handle;
pub mod model_resolver;
pub mod onnx_yolo_detector;
