// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Offscreen render targets.

A render target is a color image, a depth-stencil image and, when multisampled, a single-sample
resolve image that is what gets sampled and read back.  Its content starts out as the clear color
given at creation, including after the device objects are recreated.
*/
use logwise::privacy::LogIt;

use super::{Engine, GpuState, Release, TargetState, report, supported_samples};
use crate::bindings::descriptors::{
    BookkeepingHeaps, DescriptorHandle, DescriptorKind, ViewKind, ViewRecord,
};
use crate::imp::{self, Command, ImageDesc, ImageId, ImageUsage, Owned, QueueKind, Submission};
use crate::pixel_formats::TextureFormat;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RenderTargetDesc {
    width: u32,
    height: u32,
    clear_color: [f32; 4],
    samples: u32,
}

#[derive(Debug)]
pub(super) struct RenderTargetGpu {
    color: Owned<ImageId>,
    resolve: Option<Owned<ImageId>>,
    depth: Owned<ImageId>,
    rtv: DescriptorHandle,
    dsv: DescriptorHandle,
    srv: DescriptorHandle,
}

impl RenderTargetGpu {
    /// The single-sample image holding the final content.
    fn sampled(&self) -> ImageId {
        self.resolve.as_ref().unwrap_or(&self.color).id()
    }

    /// Resolve command for a multisampled target.
    fn resolve_command(&self) -> Option<Command> {
        self.resolve.as_ref().map(|resolve| Command::Resolve {
            source: self.color.id(),
            target: resolve.id(),
        })
    }
}

#[derive(Debug, Default)]
pub(super) struct RenderTargetEntry {
    desc: Option<RenderTargetDesc>,
    pub(super) gpu: Option<RenderTargetGpu>,
}

impl RenderTargetEntry {
    pub(super) fn target_state(&self, id: u32, descriptors: &BookkeepingHeaps) -> Option<TargetState> {
        let desc = self.desc?;
        let gpu = self.gpu.as_ref()?;
        Some(TargetState {
            id,
            color: descriptors.read(gpu.rtv)?.image,
            depth: descriptors.read(gpu.dsv).map(|record| record.image),
            samples: desc.samples,
            width: desc.width,
            height: desc.height,
        })
    }

    pub(super) fn size(&self) -> Option<(u32, u32)> {
        self.desc.map(|desc| (desc.width, desc.height))
    }

    pub(super) fn sampled_image(&self) -> Option<ImageId> {
        self.gpu.as_ref().map(RenderTargetGpu::sampled)
    }

    pub(super) fn resolve_command(&self) -> Option<Command> {
        self.gpu.as_ref().and_then(RenderTargetGpu::resolve_command)
    }
}

fn realize(gpu: &mut GpuState, desc: &RenderTargetDesc) -> Result<RenderTargetGpu, imp::Error> {
    let backend = gpu.backend.clone();
    let image = |label: &'static str, format: TextureFormat, samples: u32, usage: ImageUsage| {
        backend
            .create_image(&ImageDesc {
                label,
                width: desc.width,
                height: desc.height,
                format,
                mip_levels: 1,
                samples,
                usage,
            })
            .map(|id| Owned::new(&backend, id))
    };
    let color = image(
        "render target",
        TextureFormat::Rgba8Unorm,
        desc.samples,
        ImageUsage::ColorTarget,
    )?;
    let resolve = if desc.samples > 1 {
        Some(image(
            "render target resolve",
            TextureFormat::Rgba8Unorm,
            1,
            ImageUsage::ColorTarget,
        )?)
    } else {
        None
    };
    let depth = image(
        "render target depth",
        TextureFormat::Depth24Stencil8,
        desc.samples,
        ImageUsage::DepthStencil,
    )?;

    let mut commands = vec![
        Command::SetRenderTarget {
            color: color.id(),
            depth: Some(depth.id()),
        },
        Command::ClearColor(desc.clear_color),
        Command::ClearDepthStencil {
            depth: Some(1.0),
            stencil: Some(0),
        },
    ];
    let descriptors = &mut gpu.descriptors;
    let rtv = descriptors.allocate(DescriptorKind::RenderTarget);
    descriptors.write(
        rtv,
        ViewRecord {
            image: color.id(),
            view: ViewKind::ColorTarget,
        },
    );
    let dsv = descriptors.allocate(DescriptorKind::DepthStencil);
    descriptors.write(
        dsv,
        ViewRecord {
            image: depth.id(),
            view: ViewKind::DepthStencil,
        },
    );
    let target = RenderTargetGpu {
        color,
        resolve,
        depth,
        rtv,
        dsv,
        srv: descriptors.allocate(DescriptorKind::ShaderResource),
    };
    descriptors.write(
        target.srv,
        ViewRecord {
            image: target.sampled(),
            view: ViewKind::Sampled,
        },
    );
    commands.extend(target.resolve_command());
    if let Err(e) = gpu
        .backend
        .submit(Submission::new(QueueKind::Main, commands))
    {
        release_views(&mut gpu.descriptors, &target);
        return Err(e);
    }
    Ok(target)
}

fn release_views(descriptors: &mut BookkeepingHeaps, target: &RenderTargetGpu) {
    for handle in [target.rtv, target.dsv, target.srv] {
        descriptors.release(handle);
    }
}

impl Engine {
    /// A new render target ID.  The target is unusable until [Self::create_render_target].
    pub fn gen_render_target(&mut self) -> u32 {
        self.render_targets.generate(RenderTargetEntry::default())
    }

    /**
    Gives render target `id` a size, clear color and sample count, and clears it.

    The sample count is rounded like the default target's.  Creating an already created target
    replaces it.
    */
    pub fn create_render_target(
        &mut self,
        id: u32,
        size: (u32, u32),
        clear_color: [f32; 4],
        samples: u32,
    ) {
        let (width, height) = size;
        if self.render_targets.get(id).is_none() {
            logwise::warn_sync!("create_render_target on unknown target {id}", id = id);
            return;
        }
        self.retire_render_target_gpu(id);
        let Some(entry) = self.render_targets.get_mut(id) else {
            return;
        };
        entry.desc = None;
        if width == 0 || height == 0 {
            logwise::warn_sync!(
                "Render target {id} can't be {width}x{height}",
                id = id,
                width = width,
                height = height
            );
            return;
        }
        let desc = RenderTargetDesc {
            width,
            height,
            clear_color,
            samples: supported_samples(samples),
        };
        entry.desc = Some(desc);
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        match realize(gpu, &desc) {
            Ok(target) => entry.gpu = Some(target),
            Err(e) => report(&self.device, gpu.generation, "render target creation", &e),
        }
    }

    /// Releases render target `id` once no frame can use it.
    pub fn release_render_target(&mut self, id: u32) {
        if id == 0 {
            logwise::warn_sync!("The default target can't be released");
            return;
        }
        if self.render_targets.get(id).is_none() {
            logwise::warn_sync!("release_render_target on unknown target {id}", id = id);
            return;
        }
        let rendering_into = self
            .gpu
            .as_ref()
            .and_then(|gpu| gpu.recording.target)
            .is_some_and(|target| self.frame.in_frame && target.id == id);
        if rendering_into {
            logwise::warn_sync!(
                "Render target {id} released while active; drawing returns to the default target",
                id = id
            );
            self.set_target(0);
        }
        self.retire_render_target_gpu(id);
        if self.render_targets.mark_pending_release(id).is_none() {
            return;
        }
        match &mut self.gpu {
            Some(gpu) => gpu.release(self.frame, Release::RenderTarget(id)),
            None => self.render_targets.free(id),
        }
    }

    /**
    Registers render target `id`'s content as a texture for the next draw.

    A multisampled target is resolved first.  A target can't be sampled while it is being
    rendered into.
    */
    pub fn use_render_target_as_texture(&mut self, id: u32) {
        if !self.recording("use_render_target_as_texture") {
            return;
        }
        let (Some(gpu), Some(entry)) = (&mut self.gpu, self.render_targets.get(id)) else {
            logwise::warn_sync!("use_render_target_as_texture on unknown target {id}", id = id);
            return;
        };
        let Some(target) = &entry.gpu else {
            logwise::warn_sync!("Render target {id} has no images", id = id);
            return;
        };
        if gpu.recording.target.is_some_and(|active| active.id == id) {
            logwise::warn_sync!(
                "Render target {id} can't be sampled while it is the active target",
                id = id
            );
            return;
        }
        let Some(record) = gpu.descriptors.read(target.srv) else {
            return;
        };
        gpu.recording.commands.extend(target.resolve_command());
        gpu.recording.pending_textures.push(record);
    }

    pub fn render_target_size(&self, id: u32) -> Option<(u32, u32)> {
        self.render_targets.get(id)?.size()
    }

    /// Moves render target `id`'s images and views into the deferred-delete queues.
    fn retire_render_target_gpu(&mut self, id: u32) {
        let frame = self.frame;
        let Some(target) = self
            .render_targets
            .get_mut(id)
            .and_then(|entry| entry.gpu.take())
        else {
            return;
        };
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        for handle in [target.rtv, target.dsv, target.srv] {
            gpu.release(frame, Release::View(handle));
        }
        gpu.retire(frame, Box::new(target.color));
        gpu.retire(frame, Box::new(target.depth));
        if let Some(resolve) = target.resolve {
            gpu.retire(frame, Box::new(resolve));
        }
    }

    /// Recreates the images of every created render target, cleared to their clear colors.
    pub(super) fn realize_render_targets(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        for (id, entry) in self.render_targets.iter_mut() {
            let Some(desc) = entry.desc else {
                continue;
            };
            match realize(gpu, &desc) {
                Ok(target) => entry.gpu = Some(target),
                Err(e) => {
                    logwise::warn_sync!(
                        "Can't recreate render target {id}: {e}",
                        id = id,
                        e = LogIt(&e)
                    );
                }
            }
        }
    }
}
