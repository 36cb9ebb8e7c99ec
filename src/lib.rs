pub mod convert;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod realesrgan;
pub mod weights;

pub use engine::{SrEngine, SrEngineResponse, SrEngineResult, SrEngineState};
pub use error::SrError;
pub use model::{RequestMetadata, SrModel, UpscaleMetadata, UpscaleRequest, UpscaleResponse};
pub use pipeline::SrPipeline;
pub use realesrgan::{RealEsrgan, SCALE, TilingConfig};
pub use weights::WeightsConfig;
