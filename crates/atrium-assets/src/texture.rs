use crate::error::DecodeError;

/// Pixel format of a decoded texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
}

/// A decoded texture with raw pixel data (renderer-agnostic).
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAsset {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: TextureFormat,
}

/// Decode fetched image bytes (PNG, JPEG, etc.) into an RGBA8 texture.
pub fn decode(bytes: &[u8]) -> Result<TextureAsset, DecodeError> {
    let img = image::load_from_memory(bytes).map_err(|e| DecodeError::Image(e.to_string()))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(TextureAsset {
        width,
        height,
        data: rgba.into_raw(),
        format: TextureFormat::Rgba8,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = decode(b"definitely not an image");
        assert!(matches!(result, Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_png_round_trip() {
        let img = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();

        let tex = decode(buf.get_ref()).unwrap();
        assert_eq!((tex.width, tex.height), (3, 2));
        assert_eq!(tex.format, TextureFormat::Rgba8);
        assert_eq!(tex.data.len(), 3 * 2 * 4);
        assert_eq!(&tex.data[..4], &[10, 20, 30, 255]);
    }
}
