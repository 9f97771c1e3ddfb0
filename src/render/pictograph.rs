use crate::foundation::error::{SeqcardError, SeqcardResult};
use crate::model::sequence::PictographData;
use crate::render::new_pixmap;
use anyhow::Context as _;

/// Capability seam for the external rasterization backend.
///
/// The composition pipeline never reaches into a concrete backend directly;
/// implementations are injected at construction. A failure here is recovered
/// by the beat renderer's fallback ladder, never surfaced mid-batch.
pub trait ElementRasterizer {
    /// Rasterize one pictograph to a square canvas of `size` pixels.
    fn rasterize(&mut self, pictograph: &PictographData, size: u32)
    -> SeqcardResult<vello_cpu::Pixmap>;
}

/// Default rasterizer for pictographs carrying SVG markup.
#[derive(Default)]
pub struct SvgRasterizer {
    options: usvg::Options<'static>,
}

impl SvgRasterizer {
    pub fn new() -> Self {
        Self {
            options: usvg::Options::default(),
        }
    }
}

impl ElementRasterizer for SvgRasterizer {
    fn rasterize(
        &mut self,
        pictograph: &PictographData,
        size: u32,
    ) -> SeqcardResult<vello_cpu::Pixmap> {
        let svg = pictograph
            .svg
            .as_deref()
            .ok_or_else(|| SeqcardError::render("pictograph carries no svg markup"))?;
        if size == 0 {
            return Err(SeqcardError::invalid_input("rasterize size must be > 0"));
        }

        let tree = usvg::Tree::from_data(svg.as_bytes(), &self.options)
            .context("parse pictograph svg")?;

        let tree_size = tree.size();
        if tree_size.width() <= 0.0 || tree_size.height() <= 0.0 {
            return Err(SeqcardError::render("pictograph svg has a degenerate size"));
        }

        let mut skia = resvg::tiny_skia::Pixmap::new(size, size)
            .ok_or_else(|| SeqcardError::render("failed to allocate svg pixmap"))?;
        let sx = (size as f32) / tree_size.width();
        let sy = (size as f32) / tree_size.height();
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::from_scale(sx, sy),
            &mut skia.as_mut(),
        );

        // tiny-skia and the CPU raster backend agree on premultiplied RGBA8.
        let mut out = new_pixmap(size, size)?;
        out.data_as_u8_slice_mut().copy_from_slice(skia.data());
        Ok(out)
    }
}
