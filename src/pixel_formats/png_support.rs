// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use png::{BitDepth, ColorType};

use crate::pixel_formats::{Image, ImageFormat};

#[derive(Debug, thiserror::Error)]
#[error("Can't encode PNG {0}")]
pub struct PngError(#[from] png::EncodingError);

fn png_color_type(format: ImageFormat) -> (ColorType, ImageFormat) {
    match format {
        ImageFormat::Grayscale8 => (ColorType::Grayscale, ImageFormat::Grayscale8),
        // PNG stores straight alpha
        _ => (ColorType::Rgba, ImageFormat::Rgba8),
    }
}

pub(super) fn encode(image: &Image) -> Result<Vec<u8>, PngError> {
    let (color, layout) = png_color_type(image.format());
    let converted = image.converted(layout);
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
        encoder.set_color(color);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(converted.data())?;
        writer.finish()?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use crate::pixel_formats::{Image, ImageFormat};

    #[test]
    fn png_signature() {
        let img = Image::filled(4, 3, ImageFormat::Rgba8Premultiplied, [10, 20, 30, 255]);
        let png = img.to_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }
}
