// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Presenting to a window.
//!
//! The engine's back buffers are ordinary images; presenting blits the current one onto the
//! swap chain texture.
use std::sync::Arc;

use logwise::privacy::LogIt;

use super::Shared;
use crate::images::surface::{SurfaceBackend, SurfaceConfig};
use crate::images::view::NativeHandles;
use crate::imp::{Error, ImageId};

pub(super) struct WgpuSurface {
    // dropped before the shared device
    surface: wgpu::Surface<'static>,
    configuration: wgpu::SurfaceConfiguration,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WgpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuSurface")
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

impl WgpuSurface {
    pub(super) fn new(
        shared: Arc<Shared>,
        handles: &NativeHandles,
        config: &SurfaceConfig,
    ) -> Result<Self, Error> {
        // SAFETY: View::from_window's caller guarantees the window outlives the attachment
        let surface = unsafe {
            shared
                .instance
                .create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                    raw_display_handle: handles.display,
                    raw_window_handle: handles.window,
                })?
        };
        let capabilities = surface.get_capabilities(&shared.adapter);
        // the back buffers are already in display encoding
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| Error::Present("adapter can't present to this window".to_owned()))?;
        let alpha_mode = if config.wants_alpha
            && capabilities
                .alpha_modes
                .contains(&wgpu::CompositeAlphaMode::PreMultiplied)
        {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };
        let configuration = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: if config.max_latency == 0 {
                config.buffer_count.max(1)
            } else {
                config.max_latency
            },
            alpha_mode,
            view_formats: Vec::new(),
        };
        shared.scoped("configure surface", || {
            surface.configure(&shared.device, &configuration)
        })?;
        logwise::info_sync!(
            "Configured surface {format}",
            format = LogIt(&configuration.format)
        );
        Ok(WgpuSurface {
            surface,
            configuration,
            shared,
        })
    }

    fn reconfigure(&self) -> Result<(), Error> {
        self.shared.scoped("configure surface", || {
            self.surface
                .configure(&self.shared.device, &self.configuration)
        })
    }
}

impl SurfaceBackend for WgpuSurface {
    fn name(&self) -> &'static str {
        "wgpu swap chain"
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        self.configuration.width = width.max(1);
        self.configuration.height = height.max(1);
        self.reconfigure()
    }

    fn present(&mut self, image: ImageId) -> Result<(), Error> {
        self.shared.live()?;
        let source = self.shared.objects().image(image)?.texture.clone();
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(e @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.reconfigure()?;
                return Err(Error::Present(e.to_string()));
            }
            Err(e) => return Err(Error::Present(e.to_string())),
        };
        let target = frame.texture.create_view(&Default::default());
        let source = source.create_view(&Default::default());
        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present"),
            });
        self.shared.blitter.blit(
            &self.shared.device,
            &mut encoder,
            &source,
            &target,
            self.configuration.format,
        );
        self.shared
            .scoped("present", || self.shared.queue.submit([encoder.finish()]))?;
        frame.present();
        self.shared.poller.wake();
        Ok(())
    }
}
