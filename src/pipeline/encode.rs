//! Image encoding: `DynamicImage` to PNG [`PageImage`] to base64 request part.
//!
//! PNG is lossless; JPEG artefacts around small print (answer letters,
//! circled options) measurably hurt extraction accuracy.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encoding of a [`PageImage`]'s bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// One rasterised page. Owned by whoever requested it and dropped once the
/// extraction call that consumes it has returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed, matching the source PDF numbering.
    pub page_number: usize,
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

impl PageImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Base64 body for an inline-data request part.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}

/// Encode a rendered page as PNG.
pub fn encode_page(page_number: usize, img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded page {} → {} bytes PNG", page_number, buf.len());

    Ok(PageImage {
        page_number,
        data: buf,
        format: ImageFormat::Png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let page = encode_page(4, &img).expect("encode should succeed");
        assert_eq!(page.page_number, 4);
        assert_eq!(page.mime_type(), "image/png");
        assert_eq!(&page.data[1..4], b"PNG");

        let decoded = STANDARD.decode(page.to_base64()).expect("valid base64");
        assert_eq!(decoded, page.data);
    }
}
