//! Second-pass OCR over already-detected text regions.
//!
//! Each region's bounding box is cropped and re-read by an [`OcrEngine`].
//! Only `text` changes; geometry and any extra fields are kept. A region
//! whose inference fails or comes back empty is emitted exactly as it came
//! in, so one bad crop never costs the rest of the batch.

mod local;
mod remote;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info, warn};

use imagebridge_contracts::regions::{BoundingBox, TextRegion};

use crate::config::{OcrBackendKind, OcrConfig};
use crate::error::{BridgeError, Result};

pub use local::{
    LocalModelSpec, LocalOcr, ModelCell, ModelLoader, OcrModel, OcrOutput, SHARED_MODEL,
};
pub use remote::{parse_remote_ocr_body, RemoteOcr};

pub const OCR_PROMPT: &str = "<image>\nFree OCR.";

/// Narrow inference seam: a cropped image and a prompt in, text out.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// False turns the whole refinement pass into a no-op.
    fn is_configured(&self) -> bool {
        true
    }

    fn infer(&self, image: &DynamicImage, prompt: &str) -> Result<String>;
}

pub struct OcrRefiner {
    engine: Box<dyn OcrEngine>,
    prompt: String,
}

impl OcrRefiner {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self {
            engine,
            prompt: OCR_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Picks the backend named by `config`. The local backend needs a
    /// loader; without one every region fails to load and passes through.
    pub fn from_config(config: &OcrConfig, loader: Option<Arc<dyn ModelLoader>>) -> Self {
        let engine: Box<dyn OcrEngine> = match config.backend {
            OcrBackendKind::Remote => Box::new(RemoteOcr::from_config(config)),
            OcrBackendKind::Local => {
                let loader: Arc<dyn ModelLoader> = match loader {
                    Some(loader) => loader,
                    None => Arc::new(local::missing_loader),
                };
                Box::new(LocalOcr::new(config, loader))
            }
        };
        Self::new(engine)
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn refine(&self, regions: &[TextRegion], image: &DynamicImage) -> Vec<TextRegion> {
        if !self.engine.is_configured() {
            debug!(engine = self.engine.name(), "OCR engine unconfigured; skipping refinement");
            return regions.to_vec();
        }
        info!(
            engine = self.engine.name(),
            regions = regions.len(),
            "refining OCR regions"
        );
        regions
            .iter()
            .enumerate()
            .map(|(index, region)| self.refine_region(index, region, image))
            .collect()
    }

    fn refine_region(&self, index: usize, region: &TextRegion, image: &DynamicImage) -> TextRegion {
        let Some(bbox) = region.bounding_box() else {
            return region.clone();
        };
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            let crop = crop_region(image, &bbox)?;
            self.engine.infer(&crop, &self.prompt)
        }));
        match attempt {
            Ok(Ok(text)) if !text.trim().is_empty() => region.with_text(text),
            Ok(Ok(_)) => {
                debug!(region = index, "OCR returned no text; keeping original");
                region.clone()
            }
            Ok(Err(err)) => {
                warn!(region = index, error = %err, "OCR refinement failed; keeping original");
                region.clone()
            }
            Err(_) => {
                warn!(region = index, "OCR engine panicked; keeping original");
                region.clone()
            }
        }
    }
}

/// Crops `bbox` with exclusive max edges, clamped to the image.
fn crop_region(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    let clamp = |value: i32, limit: u32| value.clamp(0, limit as i32) as u32;
    let (x0, y0) = (clamp(bbox.min_x, width), clamp(bbox.min_y, height));
    let (x1, y1) = (clamp(bbox.max_x, width), clamp(bbox.max_y, height));
    if x1 <= x0 || y1 <= y0 {
        return Err(BridgeError::inference(format!(
            "region ({}, {})-({}, {}) has no area inside {width}x{height} image",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        )));
    }
    Ok(image.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
    use serde_json::json;

    use imagebridge_contracts::regions::{TextRegion, Vertex};

    use super::{OcrEngine, OcrRefiner, OCR_PROMPT};
    use crate::config::OcrConfig;
    use crate::error::{BridgeError, Result};

    /// Answers with the crop size; fails or panics on crops of chosen widths.
    #[derive(Default)]
    struct SizeReader {
        fail_width: Option<u32>,
        panic_width: Option<u32>,
        blank_width: Option<u32>,
    }

    impl OcrEngine for SizeReader {
        fn name(&self) -> &str {
            "size-reader"
        }

        fn infer(&self, image: &DynamicImage, _prompt: &str) -> Result<String> {
            let (width, height) = image.dimensions();
            if Some(width) == self.panic_width {
                panic!("model exploded");
            }
            if Some(width) == self.fail_width {
                return Err(BridgeError::inference("cuda out of memory"));
            }
            if Some(width) == self.blank_width {
                return Ok("   ".to_string());
            }
            Ok(format!("{width}x{height}"))
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([255, 255, 255])))
    }

    fn rect(x0: i32, y0: i32, x1: i32, y1: i32, text: &str) -> TextRegion {
        TextRegion::new(
            vec![
                Vertex::new(x0, y0),
                Vertex::new(x1, y0),
                Vertex::new(x1, y1),
                Vertex::new(x0, y1),
            ],
            text,
        )
    }

    #[test]
    fn replaces_text_and_keeps_geometry() {
        let mut region = rect(10, 5, 40, 25, "old");
        region.extra.insert("confidence".to_string(), json!(0.4));
        let refiner = OcrRefiner::new(Box::new(SizeReader::default()));

        let out = refiner.refine(std::slice::from_ref(&region), &image());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), "30x20");
        assert_eq!(out[0].vertices, region.vertices);
        assert_eq!(out[0].extra.get("confidence"), Some(&json!(0.4)));
    }

    #[test]
    fn failing_region_is_left_untouched() {
        let regions = vec![
            rect(0, 0, 10, 10, "first"),
            rect(0, 0, 20, 10, "second"),
            rect(0, 0, 30, 10, "third"),
        ];
        let refiner = OcrRefiner::new(Box::new(SizeReader {
            fail_width: Some(20),
            ..SizeReader::default()
        }));

        let out = refiner.refine(&regions, &image());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].text(), "10x10");
        assert_eq!(out[1], regions[1]);
        assert_eq!(out[2].text(), "30x10");
    }

    #[test]
    fn panicking_engine_does_not_abort_the_pass() {
        let regions = vec![rect(0, 0, 10, 10, "a"), rect(0, 0, 15, 10, "b")];
        let refiner = OcrRefiner::new(Box::new(SizeReader {
            panic_width: Some(10),
            ..SizeReader::default()
        }));

        let out = refiner.refine(&regions, &image());
        assert_eq!(out[0], regions[0]);
        assert_eq!(out[1].text(), "15x10");
    }

    #[test]
    fn blank_result_keeps_original_text() {
        let regions = vec![rect(0, 0, 12, 10, "keep me")];
        let refiner = OcrRefiner::new(Box::new(SizeReader {
            blank_width: Some(12),
            ..SizeReader::default()
        }));
        assert_eq!(refiner.refine(&regions, &image()), regions);
    }

    #[test]
    fn empty_inputs_pass_through() {
        let refiner = OcrRefiner::new(Box::new(SizeReader::default()));
        assert!(refiner.refine(&[], &image()).is_empty());

        let bare = TextRegion::new(Vec::new(), "no polygon");
        assert_eq!(refiner.refine(std::slice::from_ref(&bare), &image()), vec![bare]);
    }

    #[test]
    fn degenerate_and_out_of_bounds_boxes() {
        let regions = vec![
            rect(5, 5, 5, 20, "zero width"),
            rect(-10, -10, 8, 6, "clamped"),
            rect(200, 200, 300, 300, "outside"),
        ];
        let reader = SizeReader::default();
        let refiner = OcrRefiner::new(Box::new(reader));
        let out = refiner.refine(&regions, &image());
        assert_eq!(out[0], regions[0]);
        assert_eq!(out[1].text(), "8x6");
        assert_eq!(out[2], regions[2]);
    }

    struct PromptEcho;

    impl OcrEngine for PromptEcho {
        fn name(&self) -> &str {
            "echo"
        }

        fn infer(&self, _image: &DynamicImage, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn engine_receives_fixed_prompt() {
        let regions = vec![rect(0, 0, 10, 10, "x")];
        let out = OcrRefiner::new(Box::new(PromptEcho)).refine(&regions, &image());
        assert_eq!(out[0].text(), OCR_PROMPT);

        let custom = OcrRefiner::new(Box::new(PromptEcho)).with_prompt("read it");
        assert_eq!(custom.refine(&regions, &image())[0].text(), "read it");
    }

    #[test]
    fn unconfigured_remote_backend_is_a_no_op() {
        let refiner = OcrRefiner::from_config(&OcrConfig::remote(None), None);
        assert_eq!(refiner.engine_name(), "remote");
        let regions = vec![rect(0, 0, 10, 10, "as is")];
        assert_eq!(refiner.refine(&regions, &image()), regions);
    }

    #[test]
    fn local_backend_without_loader_passes_regions_through() {
        let refiner = OcrRefiner::from_config(&OcrConfig::default(), None);
        assert_eq!(refiner.engine_name(), "local");
        let regions = vec![rect(0, 0, 10, 10, "as is")];
        assert_eq!(refiner.refine(&regions, &image()), regions);
    }
}
