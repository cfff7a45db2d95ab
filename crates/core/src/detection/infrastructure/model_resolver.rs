use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("configured model path does not exist: {0}")]
    ExplicitMissing(PathBuf),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("no model configured: set a model path or download URL, or place {name} in {}", .cache_dir.display())]
    NotConfigured { name: String, cache_dir: PathBuf },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for the weights file.
pub struct ModelSource<'a> {
    pub name: &'a str,
    /// Download location used when the cache is empty. Without one the
    /// weights must be provided locally.
    pub url: Option<&'a str>,
    /// A path configured by the operator. When set it is authoritative:
    /// nothing else is tried.
    pub explicit: Option<&'a Path>,
    pub cache_dir: PathBuf,
}

impl<'a> ModelSource<'a> {
    pub fn new(
        name: &'a str,
        url: Option<&'a str>,
        explicit: Option<&'a Path>,
    ) -> Result<Self, ModelResolveError> {
        Ok(Self {
            name,
            url,
            explicit,
            cache_dir: model_cache_dir()?,
        })
    }
}

/// Resolve the weights file.
///
/// Resolution order:
/// 1. Explicit path (must exist)
/// 2. User cache directory
/// 3. Download from URL into the cache, when a URL is configured
pub fn resolve(source: &ModelSource<'_>, progress: Option<ProgressFn>) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = source.explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::ExplicitMissing(path.to_path_buf()))
        };
    }

    let cached_path = source.cache_dir.join(source.name);
    if cached_path.is_file() {
        return Ok(cached_path);
    }

    let Some(url) = source.url else {
        return Err(ModelResolveError::NotConfigured {
            name: source.name.to_string(),
            cache_dir: source.cache_dir.clone(),
        });
    };
    log::info!("Downloading detection model from {url}");
    fs::create_dir_all(&source.cache_dir).map_err(ModelResolveError::CacheDir)?;
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/WildVision/models/`
/// - Linux: `$XDG_CACHE_HOME/WildVision/models/` or `~/.cache/WildVision/models/`
/// - Windows: `%LOCALAPPDATA%/WildVision/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join("WildVision").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = download_to(url, &temp_path, progress).and_then(|()| {
        fs::rename(&temp_path, dest).map_err(|source| ModelResolveError::Write {
            path: dest.to_path_buf(),
            source,
        })
    });

    // Never leave a truncated model behind.
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn download_to(url: &str, temp_path: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|source| ModelResolveError::Download {
            url: url.to_string(),
            source,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    // Stream in chunks so large weights never sit fully in memory.
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)
}
