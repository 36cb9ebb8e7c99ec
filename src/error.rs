use thiserror::Error;

/// Errors produced while resolving weights, decoding images, or running inference.
#[derive(Debug, Error)]
pub enum SrError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("inference error: {0}")]
    Ort(#[from] ort::Error),

    #[error("download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("model error: {0}")]
    Model(String),
}
