use crate::foundation::error::{SeqcardError, SeqcardResult};

pub type PremulRgba8 = [u8; 4];

/// Source-over for one premultiplied RGBA8 pixel.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = mul_div255(u16::from(dst[3]), inv).saturating_add(sa);

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Source-over an entire premultiplied RGBA8 buffer onto `dst`.
pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> SeqcardResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(SeqcardError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Blit a premultiplied RGBA8 tile onto a larger buffer at `(dx, dy)`.
///
/// Rows falling outside the destination are clipped, never an error; beat
/// canvases at grid edges may extend past the composed image by a fraction
/// of a pixel after scaling.
pub fn blit_over(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dx: u32,
    dy: u32,
) -> SeqcardResult<()> {
    let expect_dst = (dst_w as usize) * (dst_h as usize) * 4;
    let expect_src = (src_w as usize) * (src_h as usize) * 4;
    if dst.len() != expect_dst || src.len() != expect_src {
        return Err(SeqcardError::render("blit_over buffer size mismatch"));
    }

    let copy_w = src_w.min(dst_w.saturating_sub(dx)) as usize;
    let copy_h = src_h.min(dst_h.saturating_sub(dy)) as usize;
    for row in 0..copy_h {
        let src_off = row * (src_w as usize) * 4;
        let dst_off = ((dy as usize + row) * (dst_w as usize) + dx as usize) * 4;
        over_in_place(
            &mut dst[dst_off..dst_off + copy_w * 4],
            &src[src_off..src_off + copy_w * 4],
            1.0,
        )?;
    }
    Ok(())
}

pub fn fill_rgba8(dst: &mut [u8], rgba: PremulRgba8) {
    for px in dst.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

/// Convert premultiplied RGBA8 to straight alpha for encoding.
pub fn unpremultiply_rgba8(premul: &[u8]) -> Vec<u8> {
    let mut out = premul.to_vec();
    for px in out.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        for c in px.iter_mut().take(3) {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_alpha_0_is_noop() {
        let dst = [10, 20, 30, 40];
        let src = [255, 255, 255, 0];
        assert_eq!(over(dst, src, 1.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn blit_over_clips_out_of_bounds_rows() {
        let mut dst = vec![0u8; 4 * 4 * 4];
        let src = vec![255u8; 3 * 3 * 4];
        blit_over(&mut dst, 4, 4, &src, 3, 3, 2, 2).unwrap();

        // Only the 2x2 overlap is written.
        let px = |x: usize, y: usize| &dst[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(2, 2), &[255, 255, 255, 255]);
        assert_eq!(px(3, 3), &[255, 255, 255, 255]);
        assert_eq!(px(1, 1), &[0, 0, 0, 0]);
    }

    #[test]
    fn unpremultiply_restores_straight_values() {
        // 50% gray at 50% alpha, premultiplied.
        let premul = [64u8, 64, 64, 128];
        let straight = unpremultiply_rgba8(&premul);
        assert_eq!(straight[3], 128);
        assert!((straight[0] as i16 - 127).abs() <= 2);
    }
}
