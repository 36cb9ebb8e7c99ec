//! Locating and fetching the pretrained network weights.
//!
//! Weights are looked up at a fixed path first, then anywhere under the hub
//! cache layout `<dir>/models--<owner>--<repo>/snapshots/<hash>/<file>`, and
//! finally downloaded from the model registry when nothing is on disk.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use walkdir::WalkDir;

use crate::error::SrError;

pub const DEFAULT_WEIGHTS_DIR: &str = "weights";
pub const DEFAULT_WEIGHTS_FILE: &str = "RealESRGAN_x4.onnx";
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://huggingface.co/sberbank-ai/Real-ESRGAN/resolve/main/RealESRGAN_x4.onnx";

/// How long a single weights download may take before it is abandoned.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Where the weights live on disk and where to fetch them from when missing.
#[derive(Clone, Debug)]
pub struct WeightsConfig {
    pub dir: PathBuf,
    pub file: String,
    pub url: String,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_WEIGHTS_DIR),
            file: DEFAULT_WEIGHTS_FILE.to_string(),
            url: DEFAULT_WEIGHTS_URL.to_string(),
        }
    }
}

/// Returns a usable weights path, downloading the file when none exists.
pub fn resolve(config: &WeightsConfig) -> Result<PathBuf, SrError> {
    if let Some(path) = find_local(config) {
        log::info!("Loading existing weights from {}", path.display());
        return Ok(path);
    }
    log::info!(
        "Weights not found locally, downloading from {}",
        config.url
    );
    download(config)
}

/// Looks for the weights file without touching the network.
///
/// The fixed location `<dir>/<file>` wins; otherwise any snapshot hash under
/// the hub cache layout matches.
pub fn find_local(config: &WeightsConfig) -> Option<PathBuf> {
    let fixed = config.dir.join(&config.file);
    if fixed.is_file() {
        return Some(fixed);
    }

    WalkDir::new(&config.dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file()
                && entry.file_name().to_str() == Some(config.file.as_str())
                && entry
                    .path()
                    .components()
                    .any(|c| c.as_os_str() == "snapshots")
        })
        .map(|entry| entry.into_path())
}

/// Fetches the weights from the registry into `<dir>/<file>`.
///
/// The payload is written to a temporary file and renamed into place, so an
/// interrupted download never leaves a truncated file at the final path.
pub fn download(config: &WeightsConfig) -> Result<PathBuf, SrError> {
    fs::create_dir_all(&config.dir)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let response = client.get(&config.url).send()?.error_for_status()?;
    let bytes = response.bytes()?;

    let target = config.dir.join(&config.file);
    let tmp = target.with_extension("download");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &target)?;

    log::info!(
        "Weights saved to {} ({} bytes)",
        target.display(),
        bytes.len()
    );
    Ok(target)
}
