#![forbid(unsafe_code)]

pub mod export;
pub mod foundation;
pub mod layout;
pub mod model;
pub mod render;

pub use export::batch::{BatchExportResult, BatchExporter};
pub use export::cancel::CancelToken;
pub use export::encode::{ImageBlob, canvas_to_data_url, encode_canvas};
pub use export::file::{FileExporter, page_filename, timestamped_filename};
pub use export::options::{
    ExportCapabilities, ExportOptions, ImageFormat, ValidationReport, export_capabilities,
    validate_options,
};
pub use export::progress::{ExportStage, ProgressInfo, ProgressTracker};
pub use export::service::{ExportMetrics, ExportResult, ExportService};
pub use foundation::error::{SeqcardError, SeqcardResult};
pub use layout::grid::{GridShape, LayoutData, calculate_image_dimensions, calculate_layout};
pub use model::sequence::{BeatData, GridMode, PictographData, SequenceData, SequenceMetadata};
pub use render::beat::BeatRenderer;
pub use render::compose::{ImageComposer, MemoryEstimate, estimate_memory_usage};
pub use render::pictograph::{ElementRasterizer, SvgRasterizer};
pub use render::pool::{CanvasPool, CanvasPoolStats};
pub use render::text::{TextEngine, TextRenderer};
