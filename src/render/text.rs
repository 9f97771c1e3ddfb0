use crate::export::options::ExportOptions;
use crate::foundation::error::{SeqcardError, SeqcardResult};
use crate::layout::dimensions::beat_count_tier_factor;
use crate::render::{draw_over, new_pixmap, pixmap_size, shape_to_cpu};
use std::sync::Arc;

/// Initial word title font size at `beat_scale = 1.0`.
const WORD_FONT_BASE: f32 = 175.0;
/// Minimum font size the auto-fit loop may reach.
const WORD_FONT_FLOOR: f32 = 10.0;
/// Step used when shrinking the word font.
const WORD_FONT_STEP: f32 = 5.0;
/// Fixed inter-glyph kerning gap at `beat_scale = 1.0`, in pixels.
const KERNING_GAP_BASE: f32 = 20.0;
/// Footer font size and edge margin at `beat_scale = 1.0`.
const FOOTER_FONT_BASE: f32 = 50.0;
const FOOTER_MARGIN_BASE: f32 = 50.0;

/// RGBA8 brush carried through text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

const BLACK: TextBrush = TextBrush {
    r: 0,
    g: 0,
    b: 0,
    a: 255,
};

/// Requested text styling for one run.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
}

/// Width measurement seam for the word auto-fit loop.
pub trait TextMeasure {
    /// Total width of `text` at `font_size` with a fixed `gap` inserted
    /// between consecutive glyphs.
    fn kerned_width(&mut self, text: &str, style: TextStyle, font_size: f32, gap: f32) -> f64;
}

struct ShapedGlyph {
    id: u32,
    advance: f32,
}

struct ShapedText {
    glyphs: Vec<ShapedGlyph>,
    ascent: f32,
    descent: f32,
}

impl ShapedText {
    fn kerned_width(&self, gap: f32) -> f64 {
        let advances: f64 = self.glyphs.iter().map(|g| f64::from(g.advance)).sum();
        let gaps = self.glyphs.len().saturating_sub(1) as f64 * f64::from(gap);
        advances + gaps
    }
}

/// Stateful shaping and glyph-drawing engine over registered font bytes.
///
/// Glyphs are measured and drawn one at a time so the fixed kerning gap can
/// be inserted manually; native letter-spacing does not match the reference
/// renderer.
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    family_name: Option<String>,
    font: Option<vello_cpu::peniko::FontData>,
}

impl TextEngine {
    /// Engine with explicit font bytes (TTF/OTF).
    pub fn from_font_bytes(font_bytes: Vec<u8>) -> SeqcardResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            SeqcardError::validation("no font families registered from font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| SeqcardError::validation("registered font family has no name"))?
            .to_string();

        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(font_bytes),
            0,
        );
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name: Some(family_name),
            font: Some(font),
        })
    }

    /// Engine backed by the first usable font found in conventional system
    /// locations. Falls back to a glyphless engine (text overlays become
    /// no-ops) when none is found.
    pub fn with_system_default() -> Self {
        for path in SYSTEM_FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(path)
                && let Ok(engine) = Self::from_font_bytes(bytes)
            {
                tracing::debug!(path, "text engine using system font");
                return engine;
            }
        }
        tracing::warn!("no usable system font found; text overlays will be skipped");
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            family_name: None,
            font: None,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Compare the measured width under the configured font against a
    /// monospace fallback. Indistinguishable widths mean the font did not
    /// actually resolve. Diagnostics only; never blocks an export.
    pub fn font_available(&mut self) -> bool {
        if self.family_name.is_none() {
            return false;
        }
        let probe = "mmmWWWiii111";
        let style = TextStyle::default();
        let requested = self
            .shape(probe, style, 32.0)
            .map(|s| s.kerned_width(0.0))
            .unwrap_or(0.0);
        let fallback = self
            .shape_with_stack(
                probe,
                style,
                32.0,
                parley::style::FontStack::Single(parley::style::FontFamily::Generic(
                    parley::style::GenericFamily::Monospace,
                )),
            )
            .map(|s| s.kerned_width(0.0))
            .unwrap_or(0.0);
        requested > 0.0 && (requested - fallback).abs() > f64::EPSILON
    }

    fn shape(&mut self, text: &str, style: TextStyle, font_size: f32) -> SeqcardResult<ShapedText> {
        let family = self
            .family_name
            .clone()
            .ok_or_else(|| SeqcardError::render("text engine has no registered font"))?;
        self.shape_with_stack(
            text,
            style,
            font_size,
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family)),
        )
    }

    fn shape_with_stack(
        &mut self,
        text: &str,
        style: TextStyle,
        font_size: f32,
        stack: parley::style::FontStack<'_>,
    ) -> SeqcardResult<ShapedText> {
        if !font_size.is_finite() || font_size <= 0.0 {
            return Err(SeqcardError::render("font size must be finite and > 0"));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(stack));
        builder.push_default(parley::style::StyleProperty::FontSize(font_size));
        builder.push_default(parley::style::StyleProperty::Brush(BLACK));
        if style.bold {
            builder.push_default(parley::style::StyleProperty::FontWeight(
                parley::style::FontWeight::BOLD,
            ));
        }
        if style.italic {
            builder.push_default(parley::style::StyleProperty::FontStyle(
                parley::style::FontStyle::Italic,
            ));
        }

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);

        let mut glyphs = Vec::new();
        let mut ascent = 0.0f32;
        let mut descent = 0.0f32;
        for line in layout.lines() {
            let m = line.metrics();
            ascent = ascent.max(m.ascent);
            descent = descent.max(m.descent);
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                for g in run.glyphs() {
                    glyphs.push(ShapedGlyph {
                        id: g.id,
                        advance: g.advance,
                    });
                }
            }
        }
        Ok(ShapedText {
            glyphs,
            ascent,
            descent,
        })
    }

    /// Draw `text` glyph-by-glyph with the fixed kerning gap, anchored at
    /// `(origin_x, baseline_y)` in canvas space.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw_kerned(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        text: &str,
        style: TextStyle,
        font_size: f32,
        gap: f32,
        origin_x: f64,
        baseline_y: f64,
        brush: TextBrush,
    ) -> SeqcardResult<()> {
        let Some(font) = self.font.clone() else {
            tracing::warn!("skipping text draw: no font registered");
            return Ok(());
        };
        let shaped = self.shape(text, style, font_size)?;
        if shaped.glyphs.is_empty() {
            return Ok(());
        }

        let mut x = origin_x as f32;
        let y = baseline_y as f32;
        let mut glyphs = Vec::with_capacity(shaped.glyphs.len());
        for g in &shaped.glyphs {
            glyphs.push(vello_cpu::Glyph {
                id: g.id,
                x,
                y,
            });
            x += g.advance + gap;
        }

        draw_over(canvas, |ctx| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            ctx.glyph_run(&font)
                .font_size(font_size)
                .fill_glyphs(glyphs.into_iter());
            Ok(())
        })
    }
}

impl TextMeasure for TextEngine {
    fn kerned_width(&mut self, text: &str, style: TextStyle, font_size: f32, gap: f32) -> f64 {
        self.shape(text, style, font_size)
            .map(|s| s.kerned_width(gap))
            .unwrap_or(0.0)
    }
}

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Pick the word title font size: start from the scaled base and shrink until
/// the kerned width plus margins fits the canvas, with a hard floor.
pub fn fit_word_font_size(
    measure: &mut dyn TextMeasure,
    word: &str,
    canvas_width: u32,
    margin: u32,
    beat_scale: f64,
) -> f32 {
    let gap = KERNING_GAP_BASE * beat_scale as f32;
    let budget = canvas_width as f64 - (canvas_width as f64) / 4.0;
    let mut font_size = (WORD_FONT_BASE * beat_scale as f32).max(WORD_FONT_FLOOR);

    while font_size > WORD_FONT_FLOOR {
        let width = measure.kerned_width(word, TextStyle::default(), font_size, gap)
            + 2.0 * f64::from(margin);
        if width <= budget {
            break;
        }
        font_size = (font_size - WORD_FONT_STEP).max(WORD_FONT_FLOOR);
    }
    font_size
}

/// Reformat an export date, stripping leading zeros from month and day.
/// Unrecognized inputs pass through unchanged.
pub fn format_export_date(date: &str) -> String {
    let parts: Vec<&str> = date.split(['-', '/']).collect();
    if parts.len() != 3 {
        return date.to_string();
    }
    let strip = |s: &str| -> String {
        let t = s.trim_start_matches('0');
        if t.is_empty() { "0".to_string() } else { t.to_string() }
    };
    format!("{}-{}-{}", strip(parts[0]), strip(parts[1]), parts[2])
}

/// Per-level gradient palettes for the difficulty badge. Level 3 carries the
/// six-stop gold-to-olive ramp; the offsets and stop lists are the contract,
/// matching the reference renderer.
const BADGE_PALETTES: [&[[u8; 3]]; 5] = [
    &[[255, 255, 255], [224, 224, 224]],
    &[[224, 224, 224], [158, 158, 158]],
    &[
        [255, 215, 0],
        [238, 201, 0],
        [218, 165, 32],
        [184, 134, 11],
        [139, 117, 0],
        [128, 128, 0],
    ],
    &[[135, 206, 235], [65, 105, 225]],
    &[[255, 107, 107], [139, 0, 0]],
];

/// Vertical multi-stop gradient tile used as the badge fill.
fn gradient_image(stops: &[[u8; 3]], w: u32, h: u32) -> SeqcardResult<vello_cpu::Image> {
    if stops.len() < 2 {
        return Err(SeqcardError::render("gradient needs at least two stops"));
    }
    let mut pm = new_pixmap(w, h)?;
    let bytes = pm.data_as_u8_slice_mut();
    let h1 = (h.max(2) - 1) as f32;
    let segments = (stops.len() - 1) as f32;
    for y in 0..h {
        let t = (y as f32) / h1 * segments;
        let i = (t.floor() as usize).min(stops.len() - 2);
        let frac = t - i as f32;
        let lerp = |a: u8, b: u8| -> u8 {
            (a as f32 + (b as f32 - a as f32) * frac)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        let c = [
            lerp(stops[i][0], stops[i + 1][0]),
            lerp(stops[i][1], stops[i + 1][1]),
            lerp(stops[i][2], stops[i + 1][2]),
            255,
        ];
        for x in 0..w {
            let idx = ((y as usize) * (w as usize) + (x as usize)) * 4;
            bytes[idx..idx + 4].copy_from_slice(&c);
        }
    }
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pm)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

/// Composite renderer for the three text overlays of a card.
pub struct TextRenderer {
    engine: TextEngine,
}

impl TextRenderer {
    pub fn new(engine: TextEngine) -> Self {
        Self { engine }
    }

    pub fn with_system_default() -> Self {
        Self::new(TextEngine::with_system_default())
    }

    pub fn engine_mut(&mut self) -> &mut TextEngine {
        &mut self.engine
    }

    /// Word title: auto-fit font, manual kerning, centered in the reserved
    /// top band.
    pub fn draw_word(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        word: &str,
        options: &ExportOptions,
        band_top: u32,
    ) -> SeqcardResult<()> {
        if word.is_empty() || band_top == 0 || !self.engine.has_font() {
            return Ok(());
        }
        let (canvas_w, _) = pixmap_size(canvas);
        let gap = KERNING_GAP_BASE * options.beat_scale as f32;
        let font_size = fit_word_font_size(
            &mut self.engine,
            word,
            canvas_w,
            options.margin,
            options.beat_scale,
        );

        let shaped = self.engine.shape(word, TextStyle::default(), font_size)?;
        let width = shaped.kerned_width(gap);
        let origin_x = ((canvas_w as f64) - width) / 2.0;
        // Vertically center the glyph box inside the reserved band.
        let baseline_y = (f64::from(band_top) + f64::from(shaped.ascent - shaped.descent)) / 2.0;

        self.engine.draw_kerned(
            canvas,
            word,
            TextStyle::default(),
            font_size,
            gap,
            origin_x.max(0.0),
            baseline_y,
            BLACK,
        )
    }

    /// Footer: user name (bold italic, left), notes (italic, center) and the
    /// export date with leading zeros stripped (italic, right).
    pub fn draw_user_info(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        options: &ExportOptions,
        beat_count: usize,
        band_bottom: u32,
    ) -> SeqcardResult<()> {
        if band_bottom == 0 || !self.engine.has_font() {
            return Ok(());
        }
        let (canvas_w, canvas_h) = pixmap_size(canvas);
        let tier = beat_count_tier_factor(beat_count) as f32;
        let font_size = FOOTER_FONT_BASE * options.beat_scale as f32 * tier;
        let margin = f64::from(FOOTER_MARGIN_BASE * options.beat_scale as f32 * tier);
        let baseline_y = f64::from(canvas_h) - f64::from(band_bottom) / 2.0 + f64::from(font_size) / 3.0;

        let name_style = TextStyle {
            bold: true,
            italic: true,
        };
        let italic = TextStyle {
            bold: false,
            italic: true,
        };

        self.engine.draw_kerned(
            canvas,
            &options.user_name,
            name_style,
            font_size,
            0.0,
            margin,
            baseline_y,
            BLACK,
        )?;

        if !options.notes.is_empty() {
            let notes_w = self
                .engine
                .kerned_width(&options.notes, italic, font_size, 0.0);
            self.engine.draw_kerned(
                canvas,
                &options.notes,
                italic,
                font_size,
                0.0,
                ((f64::from(canvas_w)) - notes_w) / 2.0,
                baseline_y,
                BLACK,
            )?;
        }

        let date = format_export_date(&options.export_date);
        if !date.is_empty() {
            let date_w = self.engine.kerned_width(&date, italic, font_size, 0.0);
            self.engine.draw_kerned(
                canvas,
                &date,
                italic,
                font_size,
                0.0,
                (f64::from(canvas_w) - margin - date_w).max(0.0),
                baseline_y,
                BLACK,
            )?;
        }
        Ok(())
    }

    /// Difficulty badge: gradient-filled circle with border and centered
    /// level digit. Levels outside 1..=5 are a range error.
    pub fn draw_difficulty_badge(
        &mut self,
        canvas: &mut vello_cpu::Pixmap,
        level: u8,
        options: &ExportOptions,
        band_top: u32,
    ) -> SeqcardResult<()> {
        if !(1..=5).contains(&level) {
            return Err(SeqcardError::validation(format!(
                "difficulty level must be between 1 and 5, got {level}"
            )));
        }
        if band_top == 0 {
            return Ok(());
        }

        let size = f64::from(band_top) * 2.0 / 3.0;
        let radius = size / 2.0;
        let margin = f64::from(band_top) / 6.0;
        let center = kurbo::Point::new(margin + radius, margin + radius);
        let border = (size * 0.05).max(1.0);

        let stops = BADGE_PALETTES[usize::from(level) - 1];
        let fill = gradient_image(stops, size.ceil().max(1.0) as u32, size.ceil().max(1.0) as u32)?;

        draw_over(canvas, |ctx| {
            // Border ring under the gradient disc.
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(center, radius)));

            // Gradient paint is anchored at the transform origin, so draw the
            // inner disc in local space.
            ctx.set_transform(crate::render::affine_to_cpu(kurbo::Affine::translate((
                center.x - radius,
                center.y - radius,
            ))));
            ctx.set_paint(fill);
            ctx.fill_path(&shape_to_cpu(&kurbo::Circle::new(
                kurbo::Point::new(radius, radius),
                radius - border,
            )));
            Ok(())
        })?;

        // Digit nudge: the gradient glyph's optical weight sits low, so the
        // digit is raised; level 3's heavier ramp gets the larger offset.
        let nudge_base: f64 = if level == 3 { -25.0 } else { -15.0 };
        let nudge = nudge_base * options.beat_scale;
        let digit = level.to_string();
        let digit_size = (size * 0.6) as f32;
        let style = TextStyle {
            bold: true,
            italic: false,
        };
        let digit_w = self.engine.kerned_width(&digit, style, digit_size, 0.0);
        if self.engine.has_font() {
            self.engine.draw_kerned(
                canvas,
                &digit,
                style,
                digit_size,
                0.0,
                center.x - digit_w / 2.0,
                center.y + f64::from(digit_size) * 0.35 + nudge,
                BLACK,
            )?;
        }
        Ok(())
    }

    pub fn font_available(&mut self) -> bool {
        self.engine.font_available()
    }
}
