use crate::foundation::error::SeqcardResult;
use crate::model::sequence::GridMode;
use crate::render::{bezpath_to_cpu, draw_over, new_pixmap, pixmap_size};
use kurbo::Point;

const GRID_RGB: (u8, u8, u8) = (85, 85, 85);

/// Line thickness relative to cell size.
const LINE_WEIGHT: f64 = 1.0 / 72.0;
/// Inset of the box outline / diamond vertices from the cell edge.
const INSET: f64 = 0.1;

/// Draw one grid pattern onto an existing beat canvas at the given opacity.
///
/// The diamond pattern is a rotated square inscribed in the cell with
/// internal cross-hairs at half the given opacity; the box pattern is an
/// inset rectangle with the same cross-hairs.
pub fn draw_grid_overlay(
    pixmap: &mut vello_cpu::Pixmap,
    mode: GridMode,
    size: u32,
    opacity: f32,
) -> SeqcardResult<()> {
    let s = size as f64;
    let weight = (s * LINE_WEIGHT).max(1.0);
    let opacity = opacity.clamp(0.0, 1.0);

    draw_over(pixmap, |ctx| {
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            GRID_RGB.0, GRID_RGB.1, GRID_RGB.2, 255,
        ));

        let outline: Vec<(Point, Point)> = match mode {
            GridMode::Diamond => {
                let top = Point::new(s / 2.0, s * INSET);
                let right = Point::new(s * (1.0 - INSET), s / 2.0);
                let bottom = Point::new(s / 2.0, s * (1.0 - INSET));
                let left = Point::new(s * INSET, s / 2.0);
                vec![
                    (top, right),
                    (right, bottom),
                    (bottom, left),
                    (left, top),
                ]
            }
            GridMode::Box => {
                let x0 = s * INSET;
                let x1 = s * (1.0 - INSET);
                vec![
                    (Point::new(x0, x0), Point::new(x1, x0)),
                    (Point::new(x1, x0), Point::new(x1, x1)),
                    (Point::new(x1, x1), Point::new(x0, x1)),
                    (Point::new(x0, x1), Point::new(x0, x0)),
                ]
            }
        };

        ctx.push_opacity_layer(opacity);
        for (a, b) in &outline {
            ctx.fill_path(&line_quad(*a, *b, weight));
        }
        ctx.pop_layer();

        // Internal cross-hairs at half the pattern opacity.
        ctx.push_opacity_layer(opacity * 0.5);
        ctx.fill_path(&line_quad(
            Point::new(s / 2.0, s * INSET),
            Point::new(s / 2.0, s * (1.0 - INSET)),
            weight,
        ));
        ctx.fill_path(&line_quad(
            Point::new(s * INSET, s / 2.0),
            Point::new(s * (1.0 - INSET), s / 2.0),
            weight,
        ));
        ctx.pop_layer();

        Ok(())
    })
}

/// Composite the opposite grid pattern onto a copy of `canvas` at full
/// opacity. Pure transform: the input canvas is left untouched.
pub fn apply_combined_grids(
    canvas: &vello_cpu::Pixmap,
    current_mode: GridMode,
) -> SeqcardResult<vello_cpu::Pixmap> {
    let (w, h) = pixmap_size(canvas);
    let mut out = new_pixmap(w, h)?;
    out.data_as_u8_slice_mut()
        .copy_from_slice(canvas.data_as_u8_slice());
    draw_grid_overlay(&mut out, current_mode.opposite(), w.min(h), 1.0)?;
    Ok(out)
}

/// A straight line expressed as a fillable thin quad.
fn line_quad(a: Point, b: Point, weight: f64) -> vello_cpu::kurbo::BezPath {
    let d = b - a;
    let len = d.hypot().max(1e-6);
    let n = kurbo::Vec2::new(-d.y / len, d.x / len) * (weight / 2.0);

    let mut path = kurbo::BezPath::new();
    path.move_to(a + n);
    path.line_to(b + n);
    path.line_to(b - n);
    path.line_to(a - n);
    path.close_path();
    bezpath_to_cpu(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_draws_visible_pixels() {
        let mut pm = new_pixmap(72, 72).unwrap();
        draw_grid_overlay(&mut pm, GridMode::Diamond, 72, 1.0).unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));

        let mut pm = new_pixmap(72, 72).unwrap();
        draw_grid_overlay(&mut pm, GridMode::Box, 72, 1.0).unwrap();
        assert!(pm.data_as_u8_slice().iter().any(|&x| x != 0));
    }

    #[test]
    fn zero_opacity_overlay_is_invisible() {
        let mut pm = new_pixmap(72, 72).unwrap();
        draw_grid_overlay(&mut pm, GridMode::Box, 72, 0.0).unwrap();
        assert!(pm.data_as_u8_slice().iter().all(|&x| x == 0));
    }

    #[test]
    fn combined_grids_returns_new_canvas_same_dims_original_untouched() {
        let mut pm = new_pixmap(64, 64).unwrap();
        draw_grid_overlay(&mut pm, GridMode::Diamond, 64, 1.0).unwrap();
        let before = pm.data_as_u8_slice().to_vec();

        let combined = apply_combined_grids(&pm, GridMode::Diamond).unwrap();
        assert_eq!(pixmap_size(&combined), pixmap_size(&pm));
        assert_eq!(pm.data_as_u8_slice(), before.as_slice());
        assert_ne!(combined.data_as_u8_slice(), before.as_slice());
    }
}
