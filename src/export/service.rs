use crate::export::cancel::CancelToken;
use crate::export::encode::{ImageBlob, canvas_to_data_url, encode_canvas};
use crate::export::options::{
    ExportCapabilities, ExportOptions, export_capabilities, validate_options,
};
use crate::foundation::error::SeqcardResult;
use crate::model::sequence::SequenceData;
use crate::render::compose::{ImageComposer, estimate_memory_usage};
use crate::render::pixmap_size;
use std::time::Instant;

/// Measurements for one successful export.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct ExportMetrics {
    pub width: u32,
    pub height: u32,
    pub encoded_bytes: usize,
    pub elapsed_ms: u64,
}

/// Per-item outcome. Failures carry a message instead of panicking or
/// aborting a batch.
#[derive(Clone, Debug)]
pub struct ExportResult {
    pub success: bool,
    pub blob: Option<ImageBlob>,
    pub error: Option<String>,
    pub metrics: Option<ExportMetrics>,
}

impl ExportResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            blob: None,
            error: Some(error.into()),
            metrics: None,
        }
    }
}

/// Top-level single-sequence export: validation, memory pre-check,
/// composition, encoding.
pub struct ExportService {
    composer: ImageComposer,
}

impl Default for ExportService {
    fn default() -> Self {
        Self::with_system_default()
    }
}

impl ExportService {
    /// The composer carries the injected rasterizer seam.
    pub fn new(composer: ImageComposer) -> Self {
        Self { composer }
    }

    pub fn with_system_default() -> Self {
        Self::new(ImageComposer::with_system_default())
    }

    pub fn composer_mut(&mut self) -> &mut ImageComposer {
        &mut self.composer
    }

    pub fn capabilities(&self) -> ExportCapabilities {
        export_capabilities()
    }

    /// Export one sequence to an encoded blob.
    ///
    /// Validation runs before any canvas work; an invalid request never
    /// allocates a canvas.
    pub fn export_sequence_image(
        &mut self,
        sequence: &SequenceData,
        options: &ExportOptions,
        cancel: &CancelToken,
    ) -> ExportResult {
        let started = Instant::now();

        if let Err(err) = sequence.validate() {
            return ExportResult::failure(err.to_string());
        }
        let report = validate_options(sequence, options);
        if !report.valid {
            tracing::warn!(errors = ?report.errors, "export rejected by validation");
            return ExportResult::failure(report.errors.join("; "));
        }
        let estimate = estimate_memory_usage(sequence, options);
        if !estimate.safe {
            return ExportResult::failure(format!(
                "estimated memory {:.1} MB exceeds the configured ceiling",
                estimate.estimated_mb
            ));
        }

        let canvas = match self
            .composer
            .compose_sequence_image(sequence, options, cancel)
        {
            Ok(canvas) => canvas,
            Err(err) => return ExportResult::failure(err.to_string()),
        };
        let (width, height) = pixmap_size(&canvas);

        match encode_canvas(&canvas, options.format, options.quality) {
            Ok(blob) => {
                let metrics = ExportMetrics {
                    width,
                    height,
                    encoded_bytes: blob.len(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                tracing::debug!(
                    sequence = %sequence.id,
                    width,
                    height,
                    bytes = metrics.encoded_bytes,
                    "exported sequence image"
                );
                ExportResult {
                    success: true,
                    blob: Some(blob),
                    error: None,
                    metrics: Some(metrics),
                }
            }
            Err(err) => ExportResult::failure(err.to_string()),
        }
    }

    /// Reduced-scale preview as a `data:` URL.
    pub fn create_preview_data_url(
        &mut self,
        sequence: &SequenceData,
        options: &ExportOptions,
    ) -> SeqcardResult<String> {
        let canvas = self.composer.create_preview(sequence, options)?;
        canvas_to_data_url(&canvas, options.format, options.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sequence::{BeatData, GridMode, PictographData, SequenceMetadata};

    const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8">
        <circle cx="4" cy="4" r="4" fill="#123456"/>
    </svg>"##;

    fn sequence(beats: usize) -> SequenceData {
        SequenceData {
            id: "s".to_string(),
            word: "WORD".to_string(),
            level: Some(2),
            beats: (1..=beats)
                .map(|n| BeatData {
                    id: format!("b{n}"),
                    beat_number: n as u32,
                    is_blank: false,
                    pictograph: Some(PictographData {
                        letter: Some('W'),
                        grid_mode: GridMode::Box,
                        svg: Some(SVG.to_string()),
                    }),
                    blue_reversal: false,
                    red_reversal: false,
                })
                .collect(),
            metadata: SequenceMetadata::default(),
        }
    }

    fn small_options() -> ExportOptions {
        let mut opts = ExportOptions::default();
        opts.beat_size = 48;
        opts
    }

    #[test]
    fn export_produces_a_png_blob_with_metrics() {
        let mut service = ExportService::with_system_default();
        let result =
            service.export_sequence_image(&sequence(4), &small_options(), &CancelToken::new());
        assert!(result.success, "error: {:?}", result.error);

        let blob = result.blob.unwrap();
        assert_eq!(blob.mime, "image/png");
        assert!(blob.len() > 0);

        let metrics = result.metrics.unwrap();
        assert!(metrics.width > 0 && metrics.height > 0);
        assert_eq!(metrics.encoded_bytes, blob.len());
    }

    #[test]
    fn invalid_options_fail_without_canvas_work() {
        let mut service = ExportService::with_system_default();
        let mut opts = small_options();
        opts.beat_scale = 99.0;
        let result = service.export_sequence_image(&sequence(2), &opts, &CancelToken::new());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Beat scale"));
        assert!(result.blob.is_none());
    }

    #[test]
    fn memory_overruns_are_rejected_up_front() {
        let mut service = ExportService::with_system_default();
        let mut opts = ExportOptions::default();
        opts.beat_size = 1000;
        opts.beat_scale = 5.0;
        let result = service.export_sequence_image(&sequence(64), &opts, &CancelToken::new());
        assert!(!result.success);
        assert!(result.error.unwrap().contains("memory"));
    }

    #[test]
    fn preview_data_url_has_the_png_prefix() {
        let mut service = ExportService::with_system_default();
        let url = service
            .create_preview_data_url(&sequence(2), &small_options())
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn capabilities_are_exposed() {
        let service = ExportService::with_system_default();
        assert_eq!(service.capabilities().max_sequence_length, 64);
    }
}
