// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! How textures are created and filled.
//!
//! ```
//! use frames_in_flight::bindings::visible_to::TextureCreateFlags;
//! let flags = TextureCreateFlags { mipmaps: true, ..TextureCreateFlags::default() };
//! assert!(flags.alpha);
//! ```

/// Declared once, at [crate::images::Engine::create_texture].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCreateFlags {
    /// The texture stores premultiplied alpha.  Without this, alpha is forced opaque on upload.
    pub alpha: bool,
    /// Allocate a full mip chain and regenerate it after every upload.
    ///
    /// Mipmapped textures always use an RGBA8 format and accept only full-size uploads.
    pub mipmaps: bool,
    /// Never use a single-channel format, even for `Alpha8` or `Grayscale8` sources.
    pub force32bit: bool,
}

impl Default for TextureCreateFlags {
    fn default() -> Self {
        TextureCreateFlags {
            alpha: true,
            mipmaps: false,
            force32bit: false,
        }
    }
}

/// Per-upload options for [crate::images::Engine::queue_texture_upload].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureUploadFlags {
    /// The source images already carry premultiplied color, even if their format says otherwise.
    pub already_premultiplied: bool,
}
