use crate::export::options::ImageFormat;
use crate::foundation::composite::unpremultiply_rgba8;
use crate::foundation::error::{SeqcardError, SeqcardResult};
use crate::render::pixmap_size;
use anyhow::Context as _;
use base64::Engine as _;
use std::io::Cursor;

/// Encoded image bytes plus their MIME type.
#[derive(Clone, Debug)]
pub struct ImageBlob {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl ImageBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encode a composed canvas to PNG or JPEG bytes.
///
/// The canvas holds premultiplied RGBA8; encoders expect straight alpha, so
/// the buffer is unpremultiplied first. JPEG flattens onto white since it
/// carries no alpha.
pub fn encode_canvas(
    canvas: &vello_cpu::Pixmap,
    format: ImageFormat,
    quality: f64,
) -> SeqcardResult<ImageBlob> {
    if !(0.0..=1.0).contains(&quality) || !quality.is_finite() {
        return Err(SeqcardError::export("quality must be between 0 and 1"));
    }
    let (width, height) = pixmap_size(canvas);

    let rgba = unpremultiply_rgba8(canvas.data_as_u8_slice());
    let img = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| SeqcardError::export("canvas byte length does not match dimensions"))?;

    let mut bytes = Vec::new();
    match format {
        ImageFormat::Png => {
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .context("encode png")?;
        }
        ImageFormat::Jpeg => {
            let rgb = flatten_on_white(&img);
            let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            let mut cursor = Cursor::new(&mut bytes);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, q);
            rgb.write_with_encoder(encoder).context("encode jpeg")?;
        }
    }

    Ok(ImageBlob {
        bytes,
        mime: format.mime(),
    })
}

/// `data:` URL for previews.
pub fn canvas_to_data_url(
    canvas: &vello_cpu::Pixmap,
    format: ImageFormat,
    quality: f64,
) -> SeqcardResult<String> {
    let blob = encode_canvas(canvas, format, quality)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&blob.bytes);
    Ok(format!("data:{};base64,{}", blob.mime, encoded))
}

fn flatten_on_white(img: &image::RgbaImage) -> image::RgbImage {
    let mut out = image::RgbImage::new(img.width(), img.height());
    for (src, dst) in img.pixels().zip(out.pixels_mut()) {
        let a = u16::from(src[3]);
        for c in 0..3 {
            let v = u16::from(src[c]) * a + 255 * (255 - a);
            dst[c] = (v / 255) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::composite::fill_rgba8;
    use crate::render::new_pixmap;

    fn red_canvas() -> vello_cpu::Pixmap {
        let mut pm = new_pixmap(16, 16).unwrap();
        fill_rgba8(pm.data_as_u8_slice_mut(), [255, 0, 0, 255]);
        pm
    }

    #[test]
    fn png_blob_has_magic_and_mime() {
        let blob = encode_canvas(&red_canvas(), ImageFormat::Png, 1.0).unwrap();
        assert_eq!(blob.mime, "image/png");
        assert!(!blob.is_empty());
        assert_eq!(&blob.bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn jpeg_blob_has_magic_and_mime() {
        let blob = encode_canvas(&red_canvas(), ImageFormat::Jpeg, 0.9).unwrap();
        assert_eq!(blob.mime, "image/jpeg");
        assert_eq!(&blob.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn quality_out_of_range_is_an_error() {
        assert!(encode_canvas(&red_canvas(), ImageFormat::Jpeg, 1.5).is_err());
        assert!(encode_canvas(&red_canvas(), ImageFormat::Png, -0.1).is_err());
    }

    #[test]
    fn data_url_carries_the_mime_prefix() {
        let url = canvas_to_data_url(&red_canvas(), ImageFormat::Png, 1.0).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert!(url.len() > "data:image/png;base64,".len());
    }

    #[test]
    fn png_roundtrips_opaque_pixels() {
        let blob = encode_canvas(&red_canvas(), ImageFormat::Png, 1.0).unwrap();
        let decoded = image::load_from_memory(&blob.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }
}
