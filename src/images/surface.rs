// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Presentation strategies.

Which [SurfaceBackend] an engine uses is decided once, when it attaches: the backend is asked for
a native presentation path for the view, and if it has none the engine renders offscreen.
*/
use std::fmt::Debug;
use std::sync::Arc;

use crate::images::view::NativeHandles;
use crate::imp::{Backend, Error, ImageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub wants_alpha: bool,
    /// 0 means no latency limit.
    pub max_latency: u32,
}

pub(crate) trait SurfaceBackend: Send + Debug {
    fn name(&self) -> &'static str;
    fn resize(&mut self, width: u32, height: u32) -> Result<(), Error>;
    /// Shows `image`, a single-sampled RGBA8 image the size of the surface.
    ///
    /// Errors other than [Error::DeviceLost] are transient: the frame is dropped.
    fn present(&mut self, image: ImageId) -> Result<(), Error>;
}

#[derive(Debug)]
pub(crate) struct OffscreenSurface {
    width: u32,
    height: u32,
}

impl OffscreenSurface {
    pub(crate) fn new(config: &SurfaceConfig) -> Self {
        OffscreenSurface {
            width: config.width,
            height: config.height,
        }
    }
}

impl SurfaceBackend for OffscreenSurface {
    fn name(&self) -> &'static str {
        "offscreen"
    }
    fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        self.width = width;
        self.height = height;
        Ok(())
    }
    fn present(&mut self, _image: ImageId) -> Result<(), Error> {
        logwise::trace_sync!(
            "offscreen present {w}x{h}",
            w = self.width,
            h = self.height
        );
        Ok(())
    }
}

pub(crate) fn select(
    backend: &Arc<dyn Backend>,
    handles: Option<&NativeHandles>,
    config: &SurfaceConfig,
) -> Result<Box<dyn SurfaceBackend>, Error> {
    let surface = match backend.create_surface(handles, config)? {
        Some(surface) => surface,
        None => {
            if handles.is_some() {
                logwise::warn_sync!("Backend can't present to this view; rendering offscreen");
            }
            Box::new(OffscreenSurface::new(config))
        }
    };
    logwise::info_sync!(
        "Selected surface strategy {name}",
        name = logwise::privacy::LogIt(surface.name())
    );
    Ok(surface)
}
