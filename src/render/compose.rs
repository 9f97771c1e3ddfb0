use crate::export::cancel::CancelToken;
use crate::export::options::{ExportOptions, MAX_MEMORY_MB};
use crate::foundation::composite::{blit_over, fill_rgba8};
use crate::foundation::error::{SeqcardError, SeqcardResult};
use crate::layout::dimensions::determine_additional_heights;
use crate::layout::grid::{
    GridShape, LayoutData, calculate_image_dimensions, calculate_layout, scaled_beat_size,
};
use crate::model::sequence::SequenceData;
use crate::render::beat::BeatRenderer;
use crate::render::pictograph::SvgRasterizer;
use crate::render::text::{TextEngine, TextRenderer};
use crate::render::{new_pixmap, pixmap_size};

const WHITE: [u8; 4] = [255, 255, 255, 255];

/// Scale reduction applied by [`ImageComposer::create_preview`].
const PREVIEW_SCALE_FACTOR: f64 = 0.25;

/// Estimated memory footprint of one composition.
#[derive(Clone, Copy, Debug, serde::Serialize)]
pub struct MemoryEstimate {
    pub estimated_mb: f64,
    pub safe: bool,
}

/// Orchestrator: layout, beat canvases, background, blitting, text overlays.
pub struct ImageComposer {
    beats: BeatRenderer,
    text: TextRenderer,
}

impl Default for ImageComposer {
    fn default() -> Self {
        Self::with_system_default()
    }
}

impl ImageComposer {
    pub fn new(beats: BeatRenderer, text: TextRenderer) -> Self {
        Self { beats, text }
    }

    /// Composer wired with the SVG backend and a system font.
    pub fn with_system_default() -> Self {
        let mut text = TextRenderer::with_system_default();
        if !text.font_available() {
            tracing::warn!("configured font is indistinguishable from fallback metrics");
        }
        Self::new(
            BeatRenderer::new(
                Box::new(SvgRasterizer::new()),
                TextEngine::with_system_default(),
            ),
            text,
        )
    }

    pub fn beat_renderer_mut(&mut self) -> &mut BeatRenderer {
        &mut self.beats
    }

    /// Derived layout for one export call.
    pub fn layout_for(&self, sequence: &SequenceData, options: &ExportOptions) -> LayoutData {
        let beat_count = sequence.beats.len();
        let shape = calculate_layout(beat_count, options.include_start_position);
        let (top, bottom) = determine_additional_heights(options, beat_count, options.beat_scale);
        LayoutData {
            columns: shape.columns,
            rows: shape.rows,
            beat_size: options.beat_size,
            include_start_position: options.include_start_position,
            additional_height_top: top,
            additional_height_bottom: bottom,
        }
    }

    /// Full composition: layout, beat rendering, blitting and text overlays.
    pub fn compose_sequence_image(
        &mut self,
        sequence: &SequenceData,
        options: &ExportOptions,
        cancel: &CancelToken,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        let estimate = estimate_memory_usage(sequence, options);
        if !estimate.safe {
            return Err(SeqcardError::validation(format!(
                "estimated memory {:.1} MB exceeds the {MAX_MEMORY_MB} MB ceiling",
                estimate.estimated_mb
            )));
        }

        let layout = self.layout_for(sequence, options);
        let cell = scaled_beat_size(layout.beat_size, options.beat_scale);

        let start_canvas = if layout.include_start_position {
            Some(self.beats.render_start_position(sequence, cell, options)?)
        } else {
            None
        };
        let beat_canvases = self.beats.render_beats(sequence, cell, options, cancel)?;

        let mut canvas = self.compose_from_canvases(&beat_canvases, start_canvas.as_ref(), &layout, options)?;

        for pm in beat_canvases {
            self.beats.release(pm);
        }
        if let Some(pm) = start_canvas {
            self.beats.release(pm);
        }

        if options.add_word {
            self.text
                .draw_word(&mut canvas, &sequence.word, options, layout.additional_height_top)?;
        }
        if options.add_difficulty_level
            && let Some(level) = sequence.level
        {
            self.text
                .draw_difficulty_badge(&mut canvas, level, options, layout.additional_height_top)?;
        }
        if options.add_user_info {
            self.text.draw_user_info(
                &mut canvas,
                options,
                sequence.beats.len(),
                layout.additional_height_bottom,
            )?;
        }

        Ok(canvas)
    }

    /// Background fill and grid blitting for pre-rendered canvases.
    ///
    /// Cell (0,0) is reserved for the start-position canvas when present;
    /// beats then flow row-major, skipping that reserved column on row 0 only.
    pub fn compose_from_canvases(
        &mut self,
        beat_canvases: &[vello_cpu::Pixmap],
        start_canvas: Option<&vello_cpu::Pixmap>,
        layout: &LayoutData,
        options: &ExportOptions,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        let shape = GridShape {
            columns: layout.columns,
            rows: layout.rows,
        };
        let total_extra = layout.additional_height_top + layout.additional_height_bottom;
        let (width, height) =
            calculate_image_dimensions(shape, total_extra, layout.beat_size, options.beat_scale)?;

        let cell = scaled_beat_size(layout.beat_size, options.beat_scale);
        let mut canvas = new_pixmap(width, height)?;
        fill_rgba8(canvas.data_as_u8_slice_mut(), WHITE);

        let top = layout.additional_height_top;
        let blit = |canvas: &mut vello_cpu::Pixmap,
                        pm: &vello_cpu::Pixmap,
                        col: u32,
                        row: u32|
         -> SeqcardResult<()> {
            let (sw, sh) = pixmap_size(pm);
            blit_over(
                canvas.data_as_u8_slice_mut(),
                width,
                height,
                pm.data_as_u8_slice(),
                sw,
                sh,
                col * cell,
                top + row * cell,
            )
        };

        let mut cursor: u32 = u32::from(start_canvas.is_some());
        if let Some(pm) = start_canvas {
            blit(&mut canvas, pm, 0, 0)?;
        }
        for pm in beat_canvases {
            let col = cursor % layout.columns;
            let row = cursor / layout.columns;
            if row >= layout.rows {
                return Err(SeqcardError::render(
                    "beat canvases do not fit the computed grid",
                ));
            }
            blit(&mut canvas, pm, col, row)?;
            cursor += 1;
        }

        Ok(canvas)
    }

    /// Reduced-scale composition for fast UI feedback.
    pub fn create_preview(
        &mut self,
        sequence: &SequenceData,
        options: &ExportOptions,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        let mut preview_options = options.clone();
        preview_options.beat_scale = (options.beat_scale * PREVIEW_SCALE_FACTOR).max(0.1);
        preview_options.quality = (options.quality * 0.7).clamp(0.0, 1.0);
        self.compose_sequence_image(sequence, &preview_options, &CancelToken::new())
    }
}

/// Sum of main-canvas and per-beat RGBA bytes, against a fixed ceiling.
///
/// Computed before any canvas is allocated; exports over the ceiling are
/// rejected up front.
pub fn estimate_memory_usage(sequence: &SequenceData, options: &ExportOptions) -> MemoryEstimate {
    let beat_count = sequence.beats.len();
    let shape = calculate_layout(beat_count, options.include_start_position);
    let (top, bottom) = determine_additional_heights(options, beat_count, options.beat_scale);
    let cell = scaled_beat_size(options.beat_size, options.beat_scale) as f64;

    let width = f64::from(shape.columns) * cell;
    let height = f64::from(shape.rows) * cell + f64::from(top + bottom);
    let main_bytes = width * height * 4.0;

    let cells = beat_count + usize::from(options.include_start_position);
    let beat_bytes = (cells as f64) * cell * cell * 4.0;

    let estimated_mb = (main_bytes + beat_bytes) / (1024.0 * 1024.0);
    MemoryEstimate {
        estimated_mb,
        safe: estimated_mb <= MAX_MEMORY_MB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sequence::{BeatData, GridMode, PictographData, SequenceMetadata};

    const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="8">
        <rect x="0" y="0" width="8" height="8" fill="#00ff00"/>
    </svg>"##;

    fn sequence(beats: usize) -> SequenceData {
        SequenceData {
            id: "s".to_string(),
            word: "TEST".to_string(),
            level: Some(3),
            beats: (1..=beats)
                .map(|n| BeatData {
                    id: format!("b{n}"),
                    beat_number: n as u32,
                    is_blank: false,
                    pictograph: Some(PictographData {
                        letter: Some('T'),
                        grid_mode: GridMode::Diamond,
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
    fn composition_matches_layout_dimensions() {
        let mut composer = ImageComposer::with_system_default();
        let seq = sequence(4);
        let opts = small_options();

        let layout = composer.layout_for(&seq, &opts);
        let canvas = composer
            .compose_sequence_image(&seq, &opts, &CancelToken::new())
            .unwrap();

        let shape = GridShape {
            columns: layout.columns,
            rows: layout.rows,
        };
        let expected = calculate_image_dimensions(
            shape,
            layout.additional_height_top + layout.additional_height_bottom,
            opts.beat_size,
            opts.beat_scale,
        )
        .unwrap();
        assert_eq!(pixmap_size(&canvas), expected);
    }

    #[test]
    fn background_is_white_in_unused_cells() {
        let mut composer = ImageComposer::with_system_default();
        let mut opts = small_options();
        opts.add_word = false;
        opts.add_user_info = false;
        opts.add_difficulty_level = false;
        opts.add_beat_numbers = false;
        opts.include_start_position = false;

        // 4 beats in a 2x2 grid: every cell used, corners of cells stay white
        // because beat art is inset from the cell edge.
        let canvas = composer
            .compose_sequence_image(&sequence(4), &opts, &CancelToken::new())
            .unwrap();
        assert_eq!(&canvas.data_as_u8_slice()[..4], &WHITE);
    }

    #[test]
    fn composition_is_deterministic() {
        let seq = sequence(4);
        let opts = small_options();
        let mut c1 = ImageComposer::with_system_default();
        let mut c2 = ImageComposer::with_system_default();
        let a = c1
            .compose_sequence_image(&seq, &opts, &CancelToken::new())
            .unwrap();
        let b = c2
            .compose_sequence_image(&seq, &opts, &CancelToken::new())
            .unwrap();
        assert_eq!(a.data_as_u8_slice(), b.data_as_u8_slice());
    }

    #[test]
    fn memory_estimate_scales_and_gates() {
        let seq = sequence(4);
        let mut opts = ExportOptions::default();
        let small = estimate_memory_usage(&seq, &opts);
        assert!(small.safe);
        assert!(small.estimated_mb > 0.0);

        opts.beat_size = 1000;
        opts.beat_scale = 5.0;
        let big = estimate_memory_usage(&sequence(64), &opts);
        assert!(!big.safe);
        assert!(big.estimated_mb > small.estimated_mb);
    }

    #[test]
    fn oversized_compositions_are_rejected_before_allocation() {
        let mut composer = ImageComposer::with_system_default();
        let mut opts = ExportOptions::default();
        opts.beat_size = 1000;
        opts.beat_scale = 5.0;
        let err = composer
            .compose_sequence_image(&sequence(64), &opts, &CancelToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    #[test]
    fn preview_is_smaller_than_the_full_render() {
        let seq = sequence(4);
        let opts = small_options();
        let mut composer = ImageComposer::with_system_default();
        let full = composer
            .compose_sequence_image(&seq, &opts, &CancelToken::new())
            .unwrap();
        let preview = composer.create_preview(&seq, &opts).unwrap();
        assert!(pixmap_size(&preview).0 < pixmap_size(&full).0);
    }

    #[test]
    fn start_position_occupies_the_first_cell() {
        let mut composer = ImageComposer::with_system_default();
        let mut opts = small_options();
        opts.include_start_position = true;
        let seq = sequence(4);
        let layout = composer.layout_for(&seq, &opts);
        // 4 beats + start = 5 cells; a 3x2 grid holds them.
        assert!(layout.columns * layout.rows >= 5);
        let canvas = composer
            .compose_sequence_image(&seq, &opts, &CancelToken::new())
            .unwrap();
        assert!(canvas.data_as_u8_slice().iter().any(|&x| x != 0));
    }
}
