//! Owned handle to the detection model.
//!
//! The handle is created once at startup and shared by `Arc` with every
//! detector. The ONNX session is built lazily on first use behind a
//! `OnceLock`, so concurrent first calls load the weights exactly once and
//! later calls read the cached state without taking the init lock. A failed
//! load is cached too: it is logged once and every detector degrades to
//! "no detections".
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use ort::session::Session;
use ort::value::ValueType;
use thiserror::Error;

use crate::shared::constants::DEFAULT_INFERENCE_SIZE;

use super::execution_provider::execution_providers;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to create inference session: {0}")]
    Session(String),
    #[error("incompatible model: {0}")]
    Incompatible(String),
}

/// Load-time options, scoped to a single handle.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelOptions {
    /// Input resolution used when the model declares a dynamic input shape.
    pub inference_size: u32,
    pub intra_threads: Option<usize>,
    /// Register the platform's accelerated execution provider (CoreML,
    /// DirectML) instead of plain CPU.
    pub platform_providers: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            inference_size: DEFAULT_INFERENCE_SIZE,
            intra_threads: None,
            platform_providers: true,
        }
    }
}

pub(crate) struct LoadedModel {
    pub(crate) session: Mutex<Session>,
    pub(crate) input_size: u32,
}

pub struct ModelHandle {
    path: PathBuf,
    options: ModelOptions,
    state: OnceLock<Result<LoadedModel, ModelLoadError>>,
    load_attempts: AtomicUsize,
}

impl ModelHandle {
    pub fn new(path: impl Into<PathBuf>, options: ModelOptions) -> Self {
        Self {
            path: path.into(),
            options,
            state: OnceLock::new(),
            load_attempts: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forces the load now instead of on first detection.
    pub fn preload(&self) -> Result<(), ModelLoadError> {
        self.loaded().map(|_| ()).map_err(Clone::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded().is_ok()
    }

    pub fn load_error(&self) -> Option<&ModelLoadError> {
        self.loaded().err()
    }

    /// Number of times the weights were actually read (0 or 1).
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Acquire)
    }

    pub(crate) fn loaded(&self) -> Result<&LoadedModel, &ModelLoadError> {
        self.state
            .get_or_init(|| {
                self.load_attempts.fetch_add(1, Ordering::AcqRel);
                let result = load(&self.path, &self.options);
                match &result {
                    Ok(model) => log::info!(
                        "Loaded detection model {} (input {}x{})",
                        self.path.display(),
                        model.input_size,
                        model.input_size
                    ),
                    Err(e) => log::error!("Detection disabled, model unavailable: {e}"),
                }
                result
            })
            .as_ref()
    }
}

fn session_err(e: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Session(e.to_string())
}

fn load(path: &Path, options: &ModelOptions) -> Result<LoadedModel, ModelLoadError> {
    if !path.is_file() {
        return Err(ModelLoadError::Missing(path.to_path_buf()));
    }

    let mut builder = Session::builder().map_err(session_err)?;
    let providers = execution_providers(options.platform_providers);
    if !providers.is_empty() {
        builder = builder
            .with_execution_providers(providers)
            .map_err(session_err)?;
    }
    if let Some(threads) = options.intra_threads {
        builder = builder.with_intra_threads(threads).map_err(session_err)?;
    }
    let session = builder.commit_from_file(path).map_err(session_err)?;

    // Expect a single NCHW image input: [1, 3, H, W].
    let input_shape = session
        .inputs()
        .first()
        .and_then(|input| match input.dtype() {
            ValueType::Tensor { shape, .. } => Some(shape.to_vec()),
            _ => None,
        })
        .ok_or_else(|| ModelLoadError::Incompatible("model has no tensor input".into()))?;
    if input_shape.len() != 4 {
        return Err(ModelLoadError::Incompatible(format!(
            "expected NCHW input, got shape {input_shape:?}"
        )));
    }
    if session.outputs().is_empty() {
        return Err(ModelLoadError::Incompatible("model has no outputs".into()));
    }

    let input_size = resolve_input_size(&input_shape, options.inference_size);

    Ok(LoadedModel {
        session: Mutex::new(session),
        input_size,
    })
}

/// Uses the model's fixed height when declared, otherwise the configured size.
fn resolve_input_size(shape: &[i64], fallback: u32) -> u32 {
    match shape.get(2) {
        Some(&h) if h > 0 => h as u32,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_missing_file_reports_unavailable() {
        let handle = ModelHandle::new("/nonexistent/model.onnx", ModelOptions::default());
        assert!(!handle.is_loaded());
        assert_eq!(
            handle.load_error(),
            Some(&ModelLoadError::Missing(PathBuf::from(
                "/nonexistent/model.onnx"
            )))
        );
        assert!(handle.preload().is_err());
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let handle = Arc::new(ModelHandle::new(
            "/nonexistent/model.onnx",
            ModelOptions::default(),
        ));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                thread::spawn(move || h.is_loaded())
            })
            .collect();
        for w in workers {
            assert!(!w.join().unwrap());
        }
        assert!(!handle.is_loaded());
        assert_eq!(handle.load_attempts(), 1);
    }

    #[test]
    fn test_directory_path_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::new(dir.path(), ModelOptions::default());
        assert!(matches!(
            handle.load_error(),
            Some(ModelLoadError::Missing(_))
        ));
    }

    #[test]
    fn test_resolve_input_size() {
        assert_eq!(resolve_input_size(&[1, 3, 640, 640], 416), 640);
        assert_eq!(resolve_input_size(&[1, 3, -1, -1], 416), 416);
        assert_eq!(resolve_input_size(&[1, 3], 320), 320);
    }
}
