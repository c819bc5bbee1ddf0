use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("unrecognized image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode an uploaded payload into an 8-bit RGB pixel grid.
///
/// The format is sniffed from the bytes themselves; file names and declared
/// content types are ignored.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode(format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(12, 8, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, 90]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let img = decode_image(&encode(ImageFormat::Png)).unwrap();
        assert_eq!(img.dimensions(), (12, 8));
        assert_eq!(img.get_pixel(1, 1), &Rgb([20, 30, 90]));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = decode_image(&encode(ImageFormat::Jpeg)).unwrap();
        assert_eq!(img.dimensions(), (12, 8));
    }

    #[test]
    fn test_decode_grayscale_becomes_rgb() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([77]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();

        let img = decode_image(buf.get_ref()).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_image(b"definitely not an image"), Err(DecodeError::Image(_))));
    }

    #[test]
    fn test_decode_truncated_png() {
        let png = encode(ImageFormat::Png);
        assert!(decode_image(&png[..png.len() / 2]).is_err());
    }
}
