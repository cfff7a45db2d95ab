use ort::execution_providers::ExecutionProviderDispatch;

/// Execution providers to register for a session.
///
/// With `use_platform` off the session runs on ONNX Runtime's default CPU
/// provider. Providers that fail to initialise fall back to CPU as well.
pub fn execution_providers(use_platform: bool) -> Vec<ExecutionProviderDispatch> {
    if !use_platform {
        return Vec::new();
    }
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}
