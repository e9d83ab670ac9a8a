// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! CPU images and GPU texture formats.
//!
//! Callers hand the engine [Image]s in whatever layout they already have.  Before upload an image is
//! converted into the layout of the texture it lands in, which is chosen by [texture_format]:
//!
//! | source                    | mipmapped | `force32bit` | texture                       |
//! |---------------------------|-----------|--------------|-------------------------------|
//! | `Alpha8`, `Grayscale8`    | no        | no           | [TextureFormat::R8Unorm]      |
//! | `Bgra8*`                  | no        | –            | [TextureFormat::Bgra8Unorm]   |
//! | anything else             | –         | –            | [TextureFormat::Rgba8Unorm]   |
//!
//! Textures that want alpha store premultiplied color; textures that don't have alpha forced opaque.
//!
//! ```
//! use frames_in_flight::pixel_formats::{texture_format, ImageFormat, TextureFormat};
//! let (texture, upload) = texture_format(ImageFormat::Bgra8, true, false, false);
//! assert_eq!(texture, TextureFormat::Bgra8Unorm);
//! assert_eq!(upload, ImageFormat::Bgra8Premultiplied);
//! ```

mod png_support;

pub use png_support::PngError;

/// Formats a GPU image can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    /// 24-bit depth plus 8-bit stencil.
    Depth24Stencil8,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => 4,
            TextureFormat::Depth24Stencil8 => 4,
        }
    }
}

/// Byte layouts of CPU images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Coverage only.
    Alpha8,
    Grayscale8,
    /// Straight (non-premultiplied) alpha.
    Rgba8,
    Rgba8Premultiplied,
    /// The fourth byte is ignored and treated as opaque.
    Rgbx8,
    Bgra8,
    Bgra8Premultiplied,
    Bgrx8,
}

impl ImageFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Alpha8 | ImageFormat::Grayscale8 => 1,
            _ => 4,
        }
    }
    /// The layout [crate::images::Engine::read_texture_level] reports for a texture format.
    pub const fn for_texture(format: TextureFormat) -> ImageFormat {
        match format {
            TextureFormat::R8Unorm => ImageFormat::Grayscale8,
            TextureFormat::Bgra8Unorm => ImageFormat::Bgra8Premultiplied,
            TextureFormat::Rgba8Unorm | TextureFormat::Depth24Stencil8 => {
                ImageFormat::Rgba8Premultiplied
            }
        }
    }
}

/**
Picks the texture format for a source image, and the CPU layout the image is converted into before
upload.
*/
pub fn texture_format(
    source: ImageFormat,
    wants_alpha: bool,
    mipmapped: bool,
    force32bit: bool,
) -> (TextureFormat, ImageFormat) {
    let rgba = if wants_alpha {
        ImageFormat::Rgba8Premultiplied
    } else {
        ImageFormat::Rgbx8
    };
    if mipmapped {
        return (TextureFormat::Rgba8Unorm, rgba);
    }
    match source {
        ImageFormat::Alpha8 | ImageFormat::Grayscale8 if !force32bit => {
            (TextureFormat::R8Unorm, source)
        }
        ImageFormat::Bgra8 | ImageFormat::Bgra8Premultiplied | ImageFormat::Bgrx8 => {
            let bgra = if wants_alpha {
                ImageFormat::Bgra8Premultiplied
            } else {
                ImageFormat::Bgrx8
            };
            (TextureFormat::Bgra8Unorm, bgra)
        }
        _ => (TextureFormat::Rgba8Unorm, rgba),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ImageSizeError {
    expected: usize,
    actual: usize,
}

impl std::fmt::Display for ImageSizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Image data has {} bytes, expected {}",
            self.actual, self.expected
        )
    }
}
impl std::error::Error for ImageSizeError {}

/// A tightly packed CPU image, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    format: ImageFormat,
    data: Vec<u8>,
}

fn premultiply(c: u8, a: u8) -> u8 {
    ((c as u16 * a as u16 + 127) / 255) as u8
}

fn unpremultiply(c: u8, a: u8) -> u8 {
    if a == 0 {
        0
    } else {
        ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
    }
}

impl Image {
    pub fn new(
        width: u32,
        height: u32,
        format: ImageFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageSizeError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(ImageSizeError {
                expected,
                actual: data.len(),
            });
        }
        Ok(Image {
            width,
            height,
            format,
            data,
        })
    }

    /// An image with every pixel set to `pixel`, which is given in `format`'s byte order.
    pub fn filled(width: u32, height: u32, format: ImageFormat, pixel: [u8; 4]) -> Self {
        let bpp = format.bytes_per_pixel();
        let data = pixel[..bpp]
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * bpp)
            .collect();
        Image {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
    pub fn format(&self) -> ImageFormat {
        self.format
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The bytes of one pixel, in this image's layout.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = (y as usize * self.width as usize + x as usize) * bpp;
        self.data.get(start..start + bpp)
    }

    fn premultiplied_rgba(&self, px: &[u8]) -> [u8; 4] {
        match self.format {
            ImageFormat::Alpha8 => [0, 0, 0, px[0]],
            ImageFormat::Grayscale8 => [px[0], px[0], px[0], 255],
            ImageFormat::Rgba8 => [
                premultiply(px[0], px[3]),
                premultiply(px[1], px[3]),
                premultiply(px[2], px[3]),
                px[3],
            ],
            ImageFormat::Rgba8Premultiplied => [px[0], px[1], px[2], px[3]],
            ImageFormat::Rgbx8 => [px[0], px[1], px[2], 255],
            ImageFormat::Bgra8 => [
                premultiply(px[2], px[3]),
                premultiply(px[1], px[3]),
                premultiply(px[0], px[3]),
                px[3],
            ],
            ImageFormat::Bgra8Premultiplied => [px[2], px[1], px[0], px[3]],
            ImageFormat::Bgrx8 => [px[2], px[1], px[0], 255],
        }
    }

    /**
    Converts into another layout.

    Conversion goes through premultiplied RGBA.  Single-channel targets keep their channel when the
    source has the same layout; otherwise alpha (for `Alpha8`) or red (for `Grayscale8`) is taken.
    */
    pub fn converted(&self, target: ImageFormat) -> Image {
        if target == self.format {
            return self.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(
            self.width as usize * self.height as usize * target.bytes_per_pixel(),
        );
        for px in self.data.chunks_exact(bpp) {
            let [r, g, b, a] = self.premultiplied_rgba(px);
            match target {
                ImageFormat::Alpha8 => data.push(a),
                ImageFormat::Grayscale8 => data.push(r),
                ImageFormat::Rgba8 => data.extend_from_slice(&[
                    unpremultiply(r, a),
                    unpremultiply(g, a),
                    unpremultiply(b, a),
                    a,
                ]),
                ImageFormat::Rgba8Premultiplied => data.extend_from_slice(&[r, g, b, a]),
                ImageFormat::Rgbx8 => data.extend_from_slice(&[r, g, b, 255]),
                ImageFormat::Bgra8 => data.extend_from_slice(&[
                    unpremultiply(b, a),
                    unpremultiply(g, a),
                    unpremultiply(r, a),
                    a,
                ]),
                ImageFormat::Bgra8Premultiplied => data.extend_from_slice(&[b, g, r, a]),
                ImageFormat::Bgrx8 => data.extend_from_slice(&[b, g, r, 255]),
            }
        }
        Image {
            width: self.width,
            height: self.height,
            format: target,
            data,
        }
    }

    /// Copies `source` (same layout) into this image at `(x, y)`, clipping at the edges.
    pub(crate) fn blit(&mut self, source: &Image, x: u32, y: u32) {
        debug_assert_eq!(source.format, self.format);
        let bpp = self.format.bytes_per_pixel();
        let w = source.width.min(self.width.saturating_sub(x)) as usize;
        let h = source.height.min(self.height.saturating_sub(y));
        for row in 0..h {
            let src = row as usize * source.width as usize * bpp;
            let dst = ((y + row) as usize * self.width as usize + x as usize) * bpp;
            self.data[dst..dst + w * bpp].copy_from_slice(&source.data[src..src + w * bpp]);
        }
    }

    /// A transparent canvas of the new size holding the overlapping top-left region of this image.
    pub(crate) fn resized_canvas(&self, width: u32, height: u32) -> Image {
        let mut out = Image::filled(width, height, self.format, [0; 4]);
        out.blit(self, 0, 0);
        out
    }

    /**
    The next mip level: half size per axis (at least 1), each texel the rounded average of a 2x2
    block.  Odd edges repeat the last row or column.
    */
    pub(crate) fn downsampled(&self) -> Image {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
        let last_x = self.width.saturating_sub(1);
        let last_y = self.height.saturating_sub(1);
        for y in 0..height {
            for x in 0..width {
                let xs = [(x * 2).min(last_x), (x * 2 + 1).min(last_x)];
                let ys = [(y * 2).min(last_y), (y * 2 + 1).min(last_y)];
                for c in 0..bpp {
                    let mut sum = 0u32;
                    for sy in ys {
                        for sx in xs {
                            let i = (sy as usize * self.width as usize + sx as usize) * bpp + c;
                            sum += self.data[i] as u32;
                        }
                    }
                    data.push(((sum + 2) / 4) as u8);
                }
            }
        }
        Image {
            width,
            height,
            format: self.format,
            data,
        }
    }

    /// Encodes the image as an 8-bit PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, PngError> {
        png_support::encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_rules() {
        assert_eq!(
            texture_format(ImageFormat::Alpha8, true, false, false),
            (TextureFormat::R8Unorm, ImageFormat::Alpha8)
        );
        assert_eq!(
            texture_format(ImageFormat::Grayscale8, true, false, true).0,
            TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            texture_format(ImageFormat::Bgra8, true, true, false),
            (TextureFormat::Rgba8Unorm, ImageFormat::Rgba8Premultiplied)
        );
        assert_eq!(
            texture_format(ImageFormat::Rgba8, false, false, false),
            (TextureFormat::Rgba8Unorm, ImageFormat::Rgbx8)
        );
    }

    #[test]
    fn premultiplies_straight_alpha() {
        let img = Image::new(1, 1, ImageFormat::Rgba8, vec![255, 128, 0, 128]).unwrap();
        let p = img.converted(ImageFormat::Rgba8Premultiplied);
        assert_eq!(p.data(), &[128, 64, 0, 128]);
        let opaque = img.converted(ImageFormat::Rgbx8);
        assert_eq!(opaque.data()[3], 255);
        let bgra = img.converted(ImageFormat::Bgra8Premultiplied);
        assert_eq!(bgra.data(), &[0, 64, 128, 128]);
    }

    #[test]
    fn downsample_odd() {
        let img = Image::new(3, 1, ImageFormat::Grayscale8, vec![0, 100, 200]).unwrap();
        let half = img.downsampled();
        assert_eq!((half.width(), half.height()), (1, 1));
        assert_eq!(half.data(), &[50]);
    }

    #[test]
    fn blit_clips() {
        let mut canvas = Image::filled(2, 2, ImageFormat::Grayscale8, [0; 4]);
        let src = Image::filled(2, 2, ImageFormat::Grayscale8, [9; 4]);
        canvas.blit(&src, 1, 1);
        assert_eq!(canvas.data(), &[0, 0, 0, 9]);
        assert!(Image::new(2, 2, ImageFormat::Rgba8, vec![0; 3]).is_err());
    }
}
