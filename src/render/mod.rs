pub mod beat;
pub mod compose;
pub mod grid_overlay;
pub mod pictograph;
pub mod pool;
pub mod text;

use crate::foundation::composite::over_in_place;
use crate::foundation::error::{SeqcardError, SeqcardResult};

/// Allocate a pixmap, guarding the `u16` dimension limit of the CPU raster
/// backend.
pub(crate) fn new_pixmap(width: u32, height: u32) -> SeqcardResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| SeqcardError::render(format!("canvas width exceeds u16: {width}")))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| SeqcardError::render(format!("canvas height exceeds u16: {height}")))?;
    if w == 0 || h == 0 {
        return Err(SeqcardError::render("canvas dimensions must be >= 1"));
    }
    Ok(vello_cpu::Pixmap::new(w, h))
}

pub(crate) fn pixmap_size(pixmap: &vello_cpu::Pixmap) -> (u32, u32) {
    (u32::from(pixmap.width()), u32::from(pixmap.height()))
}

/// Run drawing ops against a fresh context and composite the result over the
/// existing pixmap contents.
///
/// The CPU backend renders into a fresh buffer, so accumulation onto an
/// already-drawn canvas goes through a temporary surface and a premultiplied
/// over pass.
pub(crate) fn draw_over(
    dst: &mut vello_cpu::Pixmap,
    draw: impl FnOnce(&mut vello_cpu::RenderContext) -> SeqcardResult<()>,
) -> SeqcardResult<()> {
    let (w, h) = (dst.width(), dst.height());
    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.reset();
    draw(&mut ctx)?;
    ctx.flush();

    let mut tmp = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut tmp);
    over_in_place(dst.data_as_u8_slice_mut(), tmp.data_as_u8_slice(), 1.0)
}

pub(crate) fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

pub(crate) fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Flatten a kurbo shape into a fillable CPU path.
pub(crate) fn shape_to_cpu(shape: &impl kurbo::Shape) -> vello_cpu::kurbo::BezPath {
    let mut out = kurbo::BezPath::new();
    for el in shape.path_elements(0.1) {
        out.push(el);
    }
    bezpath_to_cpu(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pixmap_rejects_oversized_and_empty() {
        assert!(new_pixmap(0, 10).is_err());
        assert!(new_pixmap(10, 0).is_err());
        assert!(new_pixmap(70_000, 10).is_err());
        let pm = new_pixmap(8, 4).unwrap();
        assert_eq!(pixmap_size(&pm), (8, 4));
    }

    #[test]
    fn draw_over_accumulates_instead_of_replacing() {
        let mut dst = new_pixmap(4, 4).unwrap();
        crate::foundation::composite::fill_rgba8(
            dst.data_as_u8_slice_mut(),
            [255, 0, 0, 255],
        );

        // Draw nothing; the red base must survive.
        draw_over(&mut dst, |_ctx| Ok(())).unwrap();
        assert_eq!(&dst.data_as_u8_slice()[..4], &[255, 0, 0, 255]);
    }
}
