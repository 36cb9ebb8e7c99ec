use std::path::PathBuf;

use argh::FromArgs;
use clarus::{RealEsrgan, SrPipeline, WeightsConfig, weights};

// defaults for the directory layout
const DEFAULT_INPUT_DIR: &str = "inputs";
const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(FromArgs)]
/// Upscale every image in a directory with Real-ESRGAN x4.
struct BatchArgs {
    /// the directory of images to upscale
    #[argh(option, short = 'i', default = "PathBuf::from(DEFAULT_INPUT_DIR)")]
    input_dir: PathBuf,

    /// the directory the upscaled images are written to
    #[argh(option, short = 'o', default = "PathBuf::from(DEFAULT_OUTPUT_DIR)")]
    output_dir: PathBuf,

    /// the directory holding (or receiving) the model weights
    #[argh(option, short = 'w', default = "PathBuf::from(weights::DEFAULT_WEIGHTS_DIR)")]
    weights_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: BatchArgs = argh::from_env();

    let config = WeightsConfig {
        dir: args.weights_dir,
        ..WeightsConfig::default()
    };

    // The model is constructed once and reused for the whole directory.
    let model = RealEsrgan::new(&config)?;
    let mut pipeline = SrPipeline::new(model);

    let written = pipeline.run(&args.input_dir, &args.output_dir)?;
    log::info!(
        "✅ {written} image(s) written to {}",
        args.output_dir.display()
    );

    Ok(())
}
