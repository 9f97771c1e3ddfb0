use crate::export::cancel::CancelToken;
use crate::export::encode::{ImageBlob, encode_canvas};
use crate::export::file::{FileExporter, page_filename};
use crate::export::options::ExportOptions;
use crate::export::progress::{ExportStage, ProgressTracker};
use crate::export::service::{ExportResult, ExportService};
use crate::foundation::error::SeqcardResult;
use crate::model::sequence::SequenceData;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Aggregate outcome of one batch run.
///
/// `success_count + failure_count` equals the number of items processed,
/// which is at most the number of items submitted (fewer under
/// cancellation).
#[derive(Debug, Default)]
pub struct BatchExportResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<String>,
    pub cancelled: bool,
    pub total_processing_time: Duration,
    pub blobs: Vec<ImageBlob>,
    /// Pixel dimensions per successful blob, used for batch filenames.
    pub page_dimensions: Vec<(u32, u32)>,
}

/// Progress callback: `(current, total, message)` after each item and before
/// the save phase.
pub type ProgressFn<'a> = &'a mut dyn FnMut(usize, usize, &str);

/// Drives multi-item export with per-item error recovery, cooperative
/// cancellation and progress reporting. A single item's failure never aborts
/// the batch.
pub struct BatchExporter {
    service: ExportService,
    files: FileExporter,
    tracker: ProgressTracker,
}

impl Default for BatchExporter {
    fn default() -> Self {
        Self::new(ExportService::with_system_default(), FileExporter::default())
    }
}

impl BatchExporter {
    pub fn new(service: ExportService, files: FileExporter) -> Self {
        Self {
            service,
            files,
            tracker: ProgressTracker::new(),
        }
    }

    pub fn tracker_mut(&mut self) -> &mut ProgressTracker {
        &mut self.tracker
    }

    /// Export each sequence independently and collect blobs plus failures.
    pub fn export_sequences_as_images(
        &mut self,
        operation_id: &str,
        sequences: &[SequenceData],
        options: &ExportOptions,
        cancel: &CancelToken,
        mut on_progress: Option<ProgressFn<'_>>,
    ) -> SeqcardResult<BatchExportResult> {
        let started = Instant::now();
        let total = sequences.len();
        let mut result = BatchExportResult::default();

        self.tracker.start_operation(operation_id, total)?;
        self.tracker.set_stage(operation_id, ExportStage::Processing)?;

        for (i, sequence) in sequences.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            let item = self.service.export_sequence_image(sequence, options, cancel);
            self.record_item(operation_id, &mut result, item, &sequence.id)?;

            let message = format!("exported {} of {total}", i + 1);
            self.tracker.update_progress(operation_id, i + 1, &message)?;
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(i + 1, total, &message);
            }
        }

        self.finish(operation_id, &mut result, total, &mut on_progress)?;
        result.total_processing_time = started.elapsed();
        Ok(result)
    }

    /// Encode pre-composed page canvases; the per-item recovery and progress
    /// contract matches the sequence path.
    pub fn export_pages_as_images(
        &mut self,
        operation_id: &str,
        pages: &[vello_cpu::Pixmap],
        options: &ExportOptions,
        cancel: &CancelToken,
        mut on_progress: Option<ProgressFn<'_>>,
    ) -> SeqcardResult<BatchExportResult> {
        let started = Instant::now();
        let total = pages.len();
        let mut result = BatchExportResult::default();

        self.tracker.start_operation(operation_id, total)?;
        self.tracker.set_stage(operation_id, ExportStage::Exporting)?;

        for (i, page) in pages.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            let item = match encode_canvas(page, options.format, options.quality) {
                Ok(blob) => {
                    let (w, h) = crate::render::pixmap_size(page);
                    let metrics = crate::export::service::ExportMetrics {
                        width: w,
                        height: h,
                        encoded_bytes: blob.len(),
                        elapsed_ms: 0,
                    };
                    ExportResult {
                        success: true,
                        blob: Some(blob),
                        error: None,
                        metrics: Some(metrics),
                    }
                }
                Err(err) => ExportResult {
                    success: false,
                    blob: None,
                    error: Some(err.to_string()),
                    metrics: None,
                },
            };
            let label = format!("page {}", i + 1);
            self.record_item(operation_id, &mut result, item, &label)?;

            let message = format!("encoded {} of {total}", i + 1);
            self.tracker.update_progress(operation_id, i + 1, &message)?;
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(i + 1, total, &message);
            }
        }

        self.finish(operation_id, &mut result, total, &mut on_progress)?;
        result.total_processing_time = started.elapsed();
        Ok(result)
    }

    /// Save a batch's blobs under `dir` using the page filename pattern, with
    /// the exporter's inter-save delay between files.
    pub fn save_batch(
        &self,
        result: &BatchExportResult,
        dir: &std::path::Path,
        prefix: &str,
        options: &ExportOptions,
    ) -> SeqcardResult<Vec<PathBuf>> {
        let mut items = Vec::with_capacity(result.blobs.len());
        for (i, blob) in result.blobs.iter().enumerate() {
            let (w, h) = result.page_dimensions.get(i).copied().unwrap_or((0, 0));
            let name = page_filename(prefix, i + 1, w, h, options.format.extension());
            items.push((blob.clone(), dir.join(name)));
        }
        self.files.save_blob_batch(&items)?;
        Ok(items.into_iter().map(|(_, p)| p).collect())
    }

    /// Export sequences and write each blob to `dir` in one call.
    pub fn export_sequences_to_dir(
        &mut self,
        operation_id: &str,
        sequences: &[SequenceData],
        options: &ExportOptions,
        dir: &std::path::Path,
        prefix: &str,
        cancel: &CancelToken,
        on_progress: Option<ProgressFn<'_>>,
    ) -> SeqcardResult<BatchExportResult> {
        let result =
            self.export_sequences_as_images(operation_id, sequences, options, cancel, on_progress)?;
        if !result.blobs.is_empty() {
            self.save_batch(&result, dir, prefix, options)?;
        }
        Ok(result)
    }

    fn record_item(
        &mut self,
        operation_id: &str,
        result: &mut BatchExportResult,
        item: ExportResult,
        label: &str,
    ) -> SeqcardResult<()> {
        if item.success {
            result.success_count += 1;
            if let Some(blob) = item.blob {
                result.blobs.push(blob);
                let dims = item.metrics.map(|m| (m.width, m.height)).unwrap_or((0, 0));
                result.page_dimensions.push(dims);
            }
        } else {
            let error = item.error.unwrap_or_else(|| "unknown failure".to_string());
            tracing::warn!(item = label, %error, "batch item failed");
            result.failure_count += 1;
            result.errors.push(format!("{label}: {error}"));
            self.tracker.add_error(operation_id, &error)?;
        }
        Ok(())
    }

    fn finish(
        &mut self,
        operation_id: &str,
        result: &mut BatchExportResult,
        total: usize,
        on_progress: &mut Option<ProgressFn<'_>>,
    ) -> SeqcardResult<()> {
        let processed = result.success_count + result.failure_count;
        let message = if result.cancelled {
            format!("cancelled after {processed} of {total}")
        } else {
            format!("finalizing {processed} of {total}")
        };
        if let Some(cb) = on_progress.as_deref_mut() {
            cb(processed, total, &message);
        }

        if result.cancelled {
            self.tracker
                .complete_operation(operation_id, ExportStage::Cancelled)?;
        } else {
            self.tracker.set_stage(operation_id, ExportStage::Finalizing)?;
            self.tracker
                .complete_operation(operation_id, ExportStage::Completed)?;
        }
        Ok(())
    }
}
