use crate::export::cancel::CancelToken;
use crate::export::options::ExportOptions;
use crate::foundation::composite::blit_over;
use crate::foundation::error::{SeqcardError, SeqcardResult};
use crate::model::sequence::{BeatData, GridMode, PictographData, SequenceData};
use crate::render::grid_overlay::{apply_combined_grids, draw_grid_overlay};
use crate::render::pictograph::ElementRasterizer;
use crate::render::pool::{CanvasPool, CanvasPoolStats};
use crate::render::text::{TextBrush, TextEngine, TextMeasure, TextStyle};
use crate::render::{draw_over, pixmap_size, shape_to_cpu};
use kurbo::Point;

/// Beats rendered per chunk; bounds peak working-set size.
pub const BEAT_CHUNK_SIZE: usize = 5;

/// Grid opacity behind a fully rendered pictograph.
const BACKDROP_GRID_OPACITY: f32 = 0.35;

const BLUE_MARKER: (u8, u8, u8) = (46, 49, 146);
const RED_MARKER: (u8, u8, u8) = (237, 28, 36);
const PLACEHOLDER_GRAY: (u8, u8, u8) = (160, 160, 160);

/// Per-beat renderer with the recovery ladder and the pooled allocator.
///
/// The ladder: rasterize the symbolic pictograph through the injected
/// backend; on failure draw grid, colored markers and the letter glyph from
/// primitives; on total failure draw a crossed box. A single bad beat never
/// aborts a batch.
pub struct BeatRenderer {
    rasterizer: Box<dyn ElementRasterizer>,
    text: TextEngine,
    pool: CanvasPool,
}

impl BeatRenderer {
    pub fn new(rasterizer: Box<dyn ElementRasterizer>, text: TextEngine) -> Self {
        Self {
            rasterizer,
            text,
            pool: CanvasPool::new(),
        }
    }

    pub fn pool_stats(&self) -> CanvasPoolStats {
        self.pool.stats()
    }

    /// Return a beat canvas to the pool once it has been composited.
    pub fn release(&mut self, canvas: vello_cpu::Pixmap) {
        self.pool.release(canvas);
    }

    /// Render one beat to a square canvas of `size` pixels.
    pub fn render_beat(
        &mut self,
        beat: &BeatData,
        size: u32,
        options: &ExportOptions,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        if size == 0 {
            return Err(SeqcardError::invalid_input("beat size must be > 0"));
        }
        let mut canvas = self.pool.checkout(size, size)?;

        let grid_mode = beat
            .pictograph
            .as_ref()
            .map(|p| p.grid_mode)
            .unwrap_or(GridMode::Diamond);

        if beat.is_blank {
            draw_grid_overlay(&mut canvas, grid_mode, size, 1.0)?;
        } else if let Some(pictograph) = &beat.pictograph {
            self.draw_pictograph_with_fallback(&mut canvas, pictograph, size)?;
        } else {
            draw_placeholder(&mut canvas, size)?;
        }

        if options.combined_grids {
            let combined = apply_combined_grids(&canvas, grid_mode)?;
            self.pool.release(canvas);
            canvas = combined;
        }

        if options.add_beat_numbers && beat.beat_number > 0 {
            self.draw_beat_number(&mut canvas, beat.beat_number, size)?;
        }
        if options.add_reversal_symbols {
            draw_reversal_markers(&mut canvas, beat, size, options)?;
        }

        Ok(canvas)
    }

    /// The leading grid cell: the sequence's start pose when one exists,
    /// otherwise a default marker labeled START.
    pub fn render_start_position(
        &mut self,
        sequence: &SequenceData,
        size: u32,
        options: &ExportOptions,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        if size == 0 {
            return Err(SeqcardError::invalid_input("beat size must be > 0"));
        }
        let mut canvas = self.pool.checkout(size, size)?;

        let grid_mode = sequence
            .start_pictograph()
            .map(|p| p.grid_mode)
            .unwrap_or(GridMode::Diamond);

        match sequence.start_pictograph() {
            Some(pictograph) => {
                self.draw_pictograph_with_fallback(&mut canvas, pictograph, size)?;
            }
            None => {
                draw_grid_overlay(&mut canvas, grid_mode, size, 1.0)?;
            }
        }
        if options.combined_grids {
            let combined = apply_combined_grids(&canvas, grid_mode)?;
            self.pool.release(canvas);
            canvas = combined;
        }

        let font_size = (size as f32) / 6.0;
        let label = "START";
        let width = self
            .text
            .kerned_width(label, TextStyle { bold: true, italic: false }, font_size, 0.0);
        if self.text.has_font() {
            self.text.draw_kerned(
                &mut canvas,
                label,
                TextStyle { bold: true, italic: false },
                font_size,
                0.0,
                ((size as f64) - width) / 2.0,
                f64::from(size) * 0.5 + f64::from(font_size) / 3.0,
                TextBrush { r: 0, g: 0, b: 0, a: 255 },
            )?;
        }
        Ok(canvas)
    }

    /// Render every beat of the sequence in chunks of [`BEAT_CHUNK_SIZE`].
    ///
    /// On any failure, canvases created so far go back to the pool before the
    /// error propagates. Cancellation is checked once per beat and yields a
    /// short result rather than an error.
    pub fn render_beats(
        &mut self,
        sequence: &SequenceData,
        size: u32,
        options: &ExportOptions,
        cancel: &CancelToken,
    ) -> SeqcardResult<Vec<vello_cpu::Pixmap>> {
        let mut canvases: Vec<vello_cpu::Pixmap> = Vec::with_capacity(sequence.beats.len());

        for chunk in sequence.beats.chunks(BEAT_CHUNK_SIZE) {
            for beat in chunk {
                if cancel.is_cancelled() {
                    tracing::debug!(
                        rendered = canvases.len(),
                        total = sequence.beats.len(),
                        "beat rendering cancelled"
                    );
                    return Ok(canvases);
                }
                match self.render_beat(beat, size, options) {
                    Ok(canvas) => canvases.push(canvas),
                    Err(err) => {
                        for canvas in canvases.drain(..) {
                            self.pool.release(canvas);
                        }
                        return Err(err);
                    }
                }
            }
        }
        Ok(canvases)
    }

    fn draw_pictograph_with_fallback(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        pictograph: &PictographData,
        size: u32,
    ) -> SeqcardResult<()> {
        match self.rasterizer.rasterize(pictograph, size) {
            Ok(raster) => {
                draw_grid_overlay(canvas, pictograph.grid_mode, size, BACKDROP_GRID_OPACITY)?;
                let (w, h) = pixmap_size(canvas);
                let (sw, sh) = pixmap_size(&raster);
                blit_over(
                    canvas.data_as_u8_slice_mut(),
                    w,
                    h,
                    raster.data_as_u8_slice(),
                    sw,
                    sh,
                    0,
                    0,
                )
            }
            Err(err) => {
                tracing::warn!(error = %err, "pictograph rasterization failed; using primitive fallback");
                match self.draw_primitive_fallback(canvas, pictograph, size) {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        tracing::warn!(error = %err, "primitive fallback failed; drawing placeholder");
                        draw_placeholder(canvas, size)
                    }
                }
            }
        }
    }

    /// Fallback rung (b): grid, colored prop markers and the letter glyph.
    fn draw_primitive_fallback(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        pictograph: &PictographData,
        size: u32,
    ) -> SeqcardResult<()> {
        draw_grid_overlay(canvas, pictograph.grid_mode, size, 1.0)?;

        let s = f64::from(size);
        let r = s / 14.0;
        draw_over(canvas, |ctx| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                BLUE_MARKER.0,
                BLUE_MARKER.1,
                BLUE_MARKER.2,
                255,
            ));
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(
                Point::new(s / 2.0, s * 0.25),
                r,
            )));
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                RED_MARKER.0,
                RED_MARKER.1,
                RED_MARKER.2,
                255,
            ));
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(
                Point::new(s / 2.0, s * 0.75),
                r,
            )));
            Ok(())
        })?;

        if let Some(letter) = pictograph.letter {
            let glyph = letter.to_string();
            let font_size = (size as f32) / 3.0;
            let style = TextStyle { bold: true, italic: false };
            let width = self.text.kerned_width(&glyph, style, font_size, 0.0);
            if self.text.has_font() {
                self.text.draw_kerned(
                    canvas,
                    &glyph,
                    style,
                    font_size,
                    0.0,
                    (s - width) / 2.0,
                    s / 2.0 + f64::from(font_size) / 3.0,
                    TextBrush { r: 0, g: 0, b: 0, a: 255 },
                )?;
            }
        }
        Ok(())
    }

    fn draw_beat_number(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        number: u32,
        size: u32,
    ) -> SeqcardResult<()> {
        if !self.text.has_font() {
            return Ok(());
        }
        let label = number.to_string();
        let font_size = (size as f32) / 7.0;
        self.text.draw_kerned(
            canvas,
            &label,
            TextStyle { bold: true, italic: false },
            font_size,
            0.0,
            f64::from(size) * 0.04,
            f64::from(size) * 0.04 + f64::from(font_size),
            TextBrush { r: 0, g: 0, b: 0, a: 255 },
        )
    }
}

/// Final fallback rung (c): a visible crossed box.
fn draw_placeholder(canvas: &mut vello_cpu::Pixmap, size: u32) -> SeqcardResult<()> {
    let s = f64::from(size);
    let inset = s * 0.1;
    let weight = (s / 48.0).max(1.0);
    draw_over(canvas, |ctx| {
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            PLACEHOLDER_GRAY.0,
            PLACEHOLDER_GRAY.1,
            PLACEHOLDER_GRAY.2,
            255,
        ));
        let frame = kurbo::Rect::new(inset, inset, s - inset, s - inset);
        ctx.fill_path(&shape_to_cpu(&frame));
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        ctx.fill_path(&shape_to_cpu(&frame.inset(-weight)));
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            PLACEHOLDER_GRAY.0,
            PLACEHOLDER_GRAY.1,
            PLACEHOLDER_GRAY.2,
            255,
        ));
        ctx.fill_path(&diagonal(inset, inset, s - inset, s - inset, weight));
        ctx.fill_path(&diagonal(s - inset, inset, inset, s - inset, weight));
        Ok(())
    })
}

fn diagonal(x0: f64, y0: f64, x1: f64, y1: f64, weight: f64) -> vello_cpu::kurbo::BezPath {
    let a = Point::new(x0, y0);
    let b = Point::new(x1, y1);
    let d = b - a;
    let len = d.hypot().max(1e-6);
    let n = kurbo::Vec2::new(-d.y / len, d.x / len) * (weight / 2.0);

    let mut path = kurbo::BezPath::new();
    path.move_to(a + n);
    path.line_to(b + n);
    path.line_to(b - n);
    path.line_to(a - n);
    path.close_path();
    crate::render::bezpath_to_cpu(&path)
}

/// Small reversal dots near the bottom edge, one per visible prop color.
fn draw_reversal_markers(
    canvas: &mut vello_cpu::Pixmap,
    beat: &BeatData,
    size: u32,
    options: &ExportOptions,
) -> SeqcardResult<()> {
    let blue = beat.blue_reversal && options.blue_visible;
    let red = beat.red_reversal && options.red_visible;
    if !blue && !red {
        return Ok(());
    }
    let s = f64::from(size);
    let r = s / 24.0;
    let y = s * 0.92;
    draw_over(canvas, |ctx| {
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        if blue {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                BLUE_MARKER.0,
                BLUE_MARKER.1,
                BLUE_MARKER.2,
                255,
            ));
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(
                Point::new(s * 0.42, y),
                r,
            )));
        }
        if red {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                RED_MARKER.0,
                RED_MARKER.1,
                RED_MARKER.2,
                255,
            ));
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(
                Point::new(s * 0.58, y),
                r,
            )));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sequence::SequenceMetadata;
    use crate::render::pictograph::SvgRasterizer;

    const RED_SQUARE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
        <rect x="0" y="0" width="10" height="10" fill="#ff0000"/>
    </svg>"##;

    /// Rasterizer that always fails; exercises the fallback ladder.
    struct FailingRasterizer;

    impl ElementRasterizer for FailingRasterizer {
        fn rasterize(
            &mut self,
            _pictograph: &PictographData,
            _size: u32,
        ) -> SeqcardResult<vello_cpu::Pixmap> {
            Err(SeqcardError::render("backend unavailable"))
        }
    }

    fn renderer() -> BeatRenderer {
        BeatRenderer::new(
            Box::new(SvgRasterizer::new()),
            TextEngine::with_system_default(),
        )
    }

    fn beat(n: u32, svg: Option<&str>) -> BeatData {
        BeatData {
            id: format!("b{n}"),
            beat_number: n,
            is_blank: false,
            pictograph: Some(PictographData {
                letter: Some('A'),
                grid_mode: GridMode::Diamond,
                svg: svg.map(str::to_string),
            }),
            blue_reversal: false,
            red_reversal: false,
        }
    }

    fn sequence(beats: Vec<BeatData>) -> SequenceData {
        SequenceData {
            id: "s".to_string(),
            word: "TEST".to_string(),
            level: None,
            beats,
            metadata: SequenceMetadata::default(),
        }
    }

    #[test]
    fn zero_size_is_an_invalid_input() {
        let mut r = renderer();
        let err = r
            .render_beat(&beat(1, Some(RED_SQUARE_SVG)), 0, &ExportOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("invalid input"));
    }

    #[test]
    fn valid_svg_beat_renders_pixels() {
        let mut r = renderer();
        let pm = r
            .render_beat(&beat(1, Some(RED_SQUARE_SVG)), 64, &ExportOptions::default())
            .unwrap();
        assert_eq!(pixmap_size(&pm), (64, 64));
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn bad_pictograph_falls_back_instead_of_failing() {
        let mut r = renderer();
        // Malformed svg forces the primitive fallback rung.
        let pm = r
            .render_beat(&beat(1, Some("<not svg")), 64, &ExportOptions::default())
            .unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn failing_backend_still_produces_a_canvas() {
        let mut r = BeatRenderer::new(
            Box::new(FailingRasterizer),
            TextEngine::with_system_default(),
        );
        let pm = r
            .render_beat(&beat(1, None), 64, &ExportOptions::default())
            .unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn blank_beats_render_grid_only() {
        let mut r = renderer();
        let mut b = beat(1, None);
        b.is_blank = true;
        let mut opts = ExportOptions::default();
        opts.add_beat_numbers = false;
        let pm = r.render_beat(&b, 64, &opts).unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn render_beats_covers_the_whole_sequence_in_chunks() {
        let mut r = renderer();
        let beats: Vec<_> = (1..=7).map(|n| beat(n, Some(RED_SQUARE_SVG))).collect();
        let seq = sequence(beats);
        let canvases = r
            .render_beats(&seq, 32, &ExportOptions::default(), &CancelToken::new())
            .unwrap();
        assert_eq!(canvases.len(), 7);
    }

    #[test]
    fn cancellation_stops_future_beats_without_error() {
        let mut r = renderer();
        let beats: Vec<_> = (1..=7).map(|n| beat(n, Some(RED_SQUARE_SVG))).collect();
        let seq = sequence(beats);
        let cancel = CancelToken::new();
        cancel.cancel();
        let canvases = r
            .render_beats(&seq, 32, &ExportOptions::default(), &cancel)
            .unwrap();
        assert!(canvases.is_empty());
    }

    #[test]
    fn start_position_renders_with_or_without_a_pose() {
        let mut r = renderer();
        let opts = ExportOptions::default();

        let with_pose = sequence(vec![beat(1, Some(RED_SQUARE_SVG))]);
        let pm = r.render_start_position(&with_pose, 64, &opts).unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));

        let without = sequence(vec![]);
        let pm = r.render_start_position(&without, 64, &opts).unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn reversal_markers_respect_color_visibility() {
        let mut r = renderer();
        let mut b = beat(1, None);
        b.is_blank = true;
        b.blue_reversal = true;
        b.red_reversal = true;

        let mut opts = ExportOptions::default();
        opts.add_beat_numbers = false;
        opts.combined_grids = false;
        let both = r.render_beat(&b, 64, &opts).unwrap();

        opts.blue_visible = false;
        opts.red_visible = false;
        let none = r.render_beat(&b, 64, &opts).unwrap();
        assert_ne!(both.data_as_u8_slice(), none.data_as_u8_slice());
    }
}
