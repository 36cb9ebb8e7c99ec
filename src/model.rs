use image::RgbImage;

/// Trait for models that can be driven by the [`SrEngine`](crate::SrEngine)
/// or the [`SrPipeline`](crate::SrPipeline).
///
/// Implementors define their request and response types and the inference
/// logic that maps one to the other.
pub trait SrModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This allows the engine to keep essential information (source name, input
/// dimensions) without cloning heavy pixel data for telemetry purposes.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    /// This should avoid cloning heavy data like images.
    fn metadata(&self) -> Self::Metadata;
}

/// One super-resolution request: a decoded RGB image and where it came from.
pub struct UpscaleRequest {
    pub image: RgbImage,
    /// Original file name, used for logging and telemetry only.
    pub source: String,
}

/// The upscaled image produced for an [`UpscaleRequest`].
pub struct UpscaleResponse {
    pub image: RgbImage,
}

/// Telemetry extracted from an [`UpscaleRequest`] before inference starts.
#[derive(Clone, Debug, PartialEq)]
pub struct UpscaleMetadata {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

impl RequestMetadata for UpscaleRequest {
    type Metadata = UpscaleMetadata;

    fn metadata(&self) -> Self::Metadata {
        let (width, height) = self.image.dimensions();
        UpscaleMetadata {
            source: self.source.clone(),
            width,
            height,
        }
    }
}
