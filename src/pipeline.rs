//! Sequential directory-to-directory upscaling.

use std::fs;
use std::path::Path;

use crate::error::SrError;
use crate::model::{SrModel, UpscaleRequest, UpscaleResponse};

/// Upscales every file in an input directory into an output directory.
///
/// Outputs are numbered in processing order (`0.png`, `1.png`, ...). The
/// model is borrowed for the whole run, so it is constructed exactly once.
pub struct SrPipeline<M> {
    model: M,
}

impl<M> SrPipeline<M>
where
    M: SrModel<Request = UpscaleRequest, Response = UpscaleResponse, Error = SrError>,
{
    pub fn new(model: M) -> Self {
        Self { model }
    }

    /// Runs the pipeline and returns the number of images written.
    ///
    /// Both directories are created when missing. Entries that are not
    /// regular files are skipped; the first decode, inference, or write
    /// failure aborts the whole run.
    pub fn run(&mut self, input_dir: &Path, output_dir: &Path) -> Result<usize, SrError> {
        fs::create_dir_all(input_dir)?;
        fs::create_dir_all(output_dir)?;

        let mut written = 0;
        for entry in fs::read_dir(input_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let source = path.display().to_string();

            let image = image::open(&path)?.to_rgb8();
            let (width, height) = image.dimensions();
            log::info!("Upscaling {source} ({width}x{height})");

            let response = self.model.run(UpscaleRequest { image, source })?;

            let target = output_dir.join(format!("{written}.png"));
            response.image.save(&target)?;
            log::info!("Saved {}", target.display());
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    /// Nearest-neighbour x4, standing in for the network.
    struct FakeUpscaler;

    impl SrModel for FakeUpscaler {
        type Request = UpscaleRequest;
        type Response = UpscaleResponse;
        type Error = SrError;

        fn run(&mut self, request: UpscaleRequest) -> Result<UpscaleResponse, SrError> {
            let (width, height) = request.image.dimensions();
            let image = RgbImage::from_fn(width * 4, height * 4, |x, y| {
                *request.image.get_pixel(x / 4, y / 4)
            });
            Ok(UpscaleResponse { image })
        }
    }

    struct FailingUpscaler;

    impl SrModel for FailingUpscaler {
        type Request = UpscaleRequest;
        type Response = UpscaleResponse;
        type Error = SrError;

        fn run(&mut self, _request: UpscaleRequest) -> Result<UpscaleResponse, SrError> {
            Err(SrError::Model("induced failure".to_string()))
        }
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 40, 200]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn upscales_a_file_to_zero_png() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(&inputs).unwrap();
        write_png(&inputs, "photo.png", 5, 3);

        let written = SrPipeline::new(FakeUpscaler)
            .run(&inputs, &results)
            .unwrap();

        assert_eq!(written, 1);
        let out = image::open(results.join("0.png")).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (20, 12));
    }

    #[test]
    fn empty_input_dir_writes_nothing() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(&inputs).unwrap();

        let written = SrPipeline::new(FakeUpscaler)
            .run(&inputs, &results)
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(fs::read_dir(&results).unwrap().count(), 0);
    }

    #[test]
    fn missing_directories_are_created() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");

        let written = SrPipeline::new(FakeUpscaler)
            .run(&inputs, &results)
            .unwrap();

        assert_eq!(written, 0);
        assert!(inputs.is_dir());
        assert!(results.is_dir());
    }

    #[test]
    fn numbers_outputs_in_processing_order() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(&inputs).unwrap();
        write_png(&inputs, "a.png", 2, 2);
        write_png(&inputs, "b.png", 3, 2);
        write_png(&inputs, "c.png", 2, 4);

        let written = SrPipeline::new(FakeUpscaler)
            .run(&inputs, &results)
            .unwrap();

        assert_eq!(written, 3);
        for i in 0..3 {
            assert!(results.join(format!("{i}.png")).is_file());
        }
    }

    #[test]
    fn subdirectories_are_skipped() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(inputs.join("nested")).unwrap();
        write_png(&inputs, "photo.png", 2, 2);

        let written = SrPipeline::new(FakeUpscaler)
            .run(&inputs, &results)
            .unwrap();

        assert_eq!(written, 1);
    }

    #[test]
    fn undecodable_file_aborts_the_run() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(&inputs).unwrap();
        fs::write(inputs.join("notes.txt"), b"not an image").unwrap();

        assert!(SrPipeline::new(FakeUpscaler).run(&inputs, &results).is_err());
    }

    #[test]
    fn model_failure_aborts_before_writing() {
        let root = TempDir::new().unwrap();
        let inputs = root.path().join("inputs");
        let results = root.path().join("results");
        fs::create_dir_all(&inputs).unwrap();
        write_png(&inputs, "photo.png", 2, 2);

        assert!(
            SrPipeline::new(FailingUpscaler)
                .run(&inputs, &results)
                .is_err()
        );
        assert!(!results.join("0.png").exists());
    }
}
