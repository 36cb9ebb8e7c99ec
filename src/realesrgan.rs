//! Real-ESRGAN x4 wrapper around an ONNX Runtime session.

use std::ops::Range;
use std::path::Path;

use image::RgbImage;
use ndarray::{Array4, Ix4, s};
use ort::session::{Session, builder::GraphOptimizationLevel};

use crate::convert;
use crate::error::SrError;
use crate::model::{SrModel, UpscaleRequest, UpscaleResponse};
use crate::weights::{self, WeightsConfig};

/// Linear upscaling factor of the pretrained network.
pub const SCALE: u32 = 4;

/// Tiling configuration to bound memory and compute for large inputs.
#[derive(Clone, Debug)]
pub struct TilingConfig {
    pub enabled: bool,
    pub tile: usize,
    pub pad: usize,
    pub threshold_pixels: u64,
    pub threshold_max_dim: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tile: 512,
            pad: 16,
            threshold_pixels: 1_000_000,
            threshold_max_dim: 1024,
        }
    }
}

impl TilingConfig {
    /// Whether an input of the given size should be processed in tiles.
    pub fn should_tile(&self, width: usize, height: usize) -> bool {
        if !self.enabled {
            return false;
        }
        (width as u64) * (height as u64) > self.threshold_pixels
            || width.max(height) > self.threshold_max_dim
    }
}

/// Real-ESRGAN model wrapper providing tiled and whole-image inference.
pub struct RealEsrgan {
    session: Session,
    tiling: TilingConfig,
}

impl RealEsrgan {
    /// Resolves the weights (downloading them when missing) and loads the model.
    pub fn new(config: &WeightsConfig) -> Result<Self, SrError> {
        let path = weights::resolve(config)?;
        Self::from_path(&path)
    }

    /// Loads the model from an ONNX file already on disk.
    pub fn from_path(path: &Path) -> Result<Self, SrError> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?;
        #[cfg(feature = "cuda")]
        let builder = builder.with_execution_providers([
            ort::execution_providers::CUDAExecutionProvider::default().build(),
        ])?;
        let session = builder.commit_from_file(path)?;

        log::info!("Model loaded from {}", path.display());
        Ok(Self {
            session,
            tiling: TilingConfig::default(),
        })
    }

    pub fn set_tiling_config(&mut self, config: TilingConfig) {
        self.tiling = config;
    }

    /// Upscales one RGB image by [`SCALE`] in both dimensions.
    pub fn predict(&mut self, img: &RgbImage) -> Result<RgbImage, SrError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(SrError::Model("cannot upscale an empty image".to_string()));
        }

        // The network reshapes in half-resolution space, so odd dimensions are
        // padded to even and the padding is cropped away after upscaling.
        let nchw = convert::rgb_to_nchw(img);
        let padded = convert::pad_reflect_even(&nchw);
        let (pad_h, pad_w) = (padded.shape()[2], padded.shape()[3]);

        let out = if self.tiling.should_tile(pad_w, pad_h) {
            self.infer_tiled(&padded)?
        } else {
            self.infer_raw(&padded)?
        };

        let target_h = height as usize * SCALE as usize;
        let target_w = width as usize * SCALE as usize;
        convert::nchw_to_rgb(out.slice(s![.., .., ..target_h, ..target_w]))
    }

    /// Runs the session on one NCHW tensor and checks the fixed x4 contract.
    fn infer_raw(&mut self, input: &Array4<f32>) -> Result<Array4<f32>, SrError> {
        let (height, width) = (input.shape()[2], input.shape()[3]);

        let input_tensor = ort::value::Tensor::from_array(input.clone())?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let out_view = outputs[0].try_extract_array::<f32>()?;
        let out = out_view
            .into_dimensionality::<Ix4>()
            .map_err(|e| SrError::Model(format!("unexpected output shape: {e}")))?
            .to_owned();

        let (out_h, out_w) = (out.shape()[2], out.shape()[3]);
        if out_h != height * SCALE as usize || out_w != width * SCALE as usize {
            return Err(SrError::Model(format!(
                "weights are not a x{SCALE} model: {width}x{height} input produced {out_w}x{out_h} output"
            )));
        }
        Ok(out)
    }

    /// Upscales tile by tile, each tile carrying context padding that is
    /// cropped away before compositing onto the output canvas.
    fn infer_tiled(&mut self, input: &Array4<f32>) -> Result<Array4<f32>, SrError> {
        let scale = SCALE as usize;
        let (height, width) = (input.shape()[2], input.shape()[3]);
        let mut canvas = Array4::<f32>::zeros((1, 3, height * scale, width * scale));

        for span_y in tile_spans(height, self.tiling.tile, self.tiling.pad) {
            for span_x in tile_spans(width, self.tiling.tile, self.tiling.pad) {
                let tile = input
                    .slice(s![.., .., span_y.padded.clone(), span_x.padded.clone()])
                    .to_owned();
                let tile = convert::pad_reflect_even(&tile);
                let out = self.infer_raw(&tile)?;

                let crop_y = (span_y.start - span_y.padded.start) * scale;
                let crop_x = (span_x.start - span_x.padded.start) * scale;
                let tile_h = (span_y.end - span_y.start) * scale;
                let tile_w = (span_x.end - span_x.start) * scale;

                canvas
                    .slice_mut(s![
                        ..,
                        ..,
                        span_y.start * scale..span_y.end * scale,
                        span_x.start * scale..span_x.end * scale
                    ])
                    .assign(&out.slice(s![
                        ..,
                        ..,
                        crop_y..crop_y + tile_h,
                        crop_x..crop_x + tile_w
                    ]));
            }
        }
        Ok(canvas)
    }
}

impl SrModel for RealEsrgan {
    type Request = UpscaleRequest;
    type Response = UpscaleResponse;
    type Error = SrError;

    fn run(&mut self, request: UpscaleRequest) -> Result<UpscaleResponse, SrError> {
        let image = self.predict(&request.image)?;
        Ok(UpscaleResponse { image })
    }
}

/// One tile along a single axis: `start..end` is the span written to the
/// output, `padded` the context-padded span read from the input.
#[derive(Clone, Debug, PartialEq)]
struct TileSpan {
    start: usize,
    end: usize,
    padded: Range<usize>,
}

fn tile_spans(len: usize, tile: usize, pad: usize) -> Vec<TileSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + tile).min(len);
        spans.push(TileSpan {
            start,
            end,
            padded: start.saturating_sub(pad)..(end + pad).min(len),
        });
        start += tile;
    }
    spans
}
