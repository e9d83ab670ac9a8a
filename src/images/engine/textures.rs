// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The texture pool and the upload path.

Uploads go through the transfer queue, each one signaling the next value of the upload fence.
The value is remembered on the texture; the first command list that samples the texture waits for
it on the GPU, and mip generation for it runs at the top of that list.

Every texture keeps a CPU *shadow* of its level 0 in the upload layout.  After device loss the
image is recreated and the shadow uploaded again.
*/
use logwise::privacy::LogIt;

use super::{Engine, GpuState, Release, report};
use crate::bindings::descriptors::{DescriptorHandle, DescriptorKind, ViewKind, ViewRecord};
use crate::bindings::visible_to::{TextureCreateFlags, TextureUploadFlags};
use crate::bittricks::{mip_level_size, mip_map_levels};
use crate::imp::{
    self, Command, ImageDesc, ImageId, ImageUsage, Owned, QueueKind, Submission,
};
use crate::pixel_formats::{Image, ImageFormat, TextureFormat, texture_format};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextureDesc {
    width: u32,
    height: u32,
    format: TextureFormat,
    /// Layout images are converted into before upload.
    upload_format: ImageFormat,
    mip_levels: u32,
}

impl TextureDesc {
    fn mipmapped(&self) -> bool {
        self.mip_levels > 1
    }
}

#[derive(Debug)]
pub(super) struct TextureGpu {
    image: Owned<ImageId>,
    srv: DescriptorHandle,
}

#[derive(Debug, Default)]
pub(super) struct TextureEntry {
    /// `None` until created, or when creation was rejected.
    desc: Option<TextureDesc>,
    shadow: Option<Image>,
    pub(super) gpu: Option<TextureGpu>,
    /// Upload fence value of the last transfer not yet known to be visible to the main queue.
    pub(super) fence_value: u64,
    /// Mip levels must be regenerated before the next use.
    mips_pending: bool,
}

/// Submits `commands` on the transfer queue and returns the upload fence value they signal.
fn submit_upload(gpu: &mut GpuState, commands: Vec<Command>) -> Result<u64, imp::Error> {
    let value = gpu.upload_fence_value + 1;
    let mut submission = Submission::new(QueueKind::Transfer, commands);
    submission.signal = Some((gpu.upload_fence.id(), value));
    gpu.backend.submit(submission)?;
    gpu.upload_fence_value = value;
    Ok(value)
}

fn upload_command(image: ImageId, source: &Image, x: u32, y: u32, width: u32, height: u32) -> Command {
    let bpp = source.format().bytes_per_pixel();
    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
    for row in y..y + height {
        let start = (row as usize * source.width() as usize + x as usize) * bpp;
        data.extend_from_slice(&source.data()[start..start + width as usize * bpp]);
    }
    Command::UploadImage {
        image,
        x,
        y,
        width,
        height,
        data,
    }
}

/// Creates the image and view for `desc`, uploading `shadow` if there is one.
fn realize(
    gpu: &mut GpuState,
    desc: &TextureDesc,
    shadow: Option<&Image>,
) -> Result<(TextureGpu, u64), imp::Error> {
    let id = gpu.backend.create_image(&ImageDesc {
        label: "texture",
        width: desc.width,
        height: desc.height,
        format: desc.format,
        mip_levels: desc.mip_levels,
        samples: 1,
        usage: ImageUsage::Texture {
            mipmapped: desc.mipmapped(),
        },
    })?;
    let image = Owned::new(&gpu.backend, id);
    let fence_value = match shadow {
        Some(shadow) => submit_upload(
            gpu,
            vec![upload_command(id, shadow, 0, 0, desc.width, desc.height)],
        )?,
        None => 0,
    };
    let srv = gpu.descriptors.allocate(DescriptorKind::ShaderResource);
    gpu.descriptors.write(
        srv,
        ViewRecord {
            image: id,
            view: ViewKind::Sampled,
        },
    );
    Ok((TextureGpu { image, srv }, fence_value))
}

/// Straight-alpha layouts relabeled as premultiplied, for sources that already are.
fn premultiplied_view(image: &Image) -> Option<Image> {
    let format = match image.format() {
        ImageFormat::Rgba8 => ImageFormat::Rgba8Premultiplied,
        ImageFormat::Bgra8 => ImageFormat::Bgra8Premultiplied,
        _ => return None,
    };
    Image::new(image.width(), image.height(), format, image.data().to_vec()).ok()
}

impl Engine {
    /// A new texture ID.  The texture is unusable until [Self::create_texture].
    pub fn gen_texture(&mut self) -> u32 {
        self.textures.generate(TextureEntry::default())
    }

    /**
    Gives texture `id` a size and format.

    The GPU format is chosen from `source` and `flags`, see
    [crate::pixel_formats::texture_format].  A mipmapped texture gets
    `floor(log2(max(width, height))) + 1` levels.  Creating an already created texture replaces it.
    */
    pub fn create_texture(
        &mut self,
        id: u32,
        size: (u32, u32),
        source: ImageFormat,
        flags: TextureCreateFlags,
    ) {
        let (width, height) = size;
        if self.textures.get(id).is_none() {
            logwise::warn_sync!("create_texture on unknown texture {id}", id = id);
            return;
        }
        self.retire_texture_gpu(id);
        let Some(entry) = self.textures.get_mut(id) else {
            return;
        };
        *entry = TextureEntry::default();
        if width == 0 || height == 0 {
            logwise::warn_sync!(
                "Texture {id} can't be {width}x{height}",
                id = id,
                width = width,
                height = height
            );
            return;
        }
        let (format, upload_format) =
            texture_format(source, flags.alpha, flags.mipmaps, flags.force32bit);
        let desc = TextureDesc {
            width,
            height,
            format,
            upload_format,
            mip_levels: if flags.mipmaps {
                mip_map_levels(width, height)
            } else {
                1
            },
        };
        entry.desc = Some(desc);
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        match realize(gpu, &desc, None) {
            Ok((texture, _)) => entry.gpu = Some(texture),
            Err(e) => report(&self.device, gpu.generation, "texture creation", &e),
        }
    }

    /**
    Uploads `images`, each at the matching entry of `positions` (missing positions are `(0, 0)`).

    Images are converted to the texture's layout and clipped to it.  A mipmapped texture takes one
    full-size image at the origin, and rejects another while the previous one is still in flight.
    */
    pub fn queue_texture_upload(
        &mut self,
        id: u32,
        images: &[Image],
        positions: &[(u32, u32)],
        flags: TextureUploadFlags,
    ) {
        let Some(desc) = self.textures.get(id).and_then(|entry| entry.desc) else {
            logwise::warn_sync!("Upload to texture {id}, which was never created", id = id);
            return;
        };
        if images.is_empty() {
            return;
        }
        if desc.mipmapped() {
            let full = images.len() == 1
                && (images[0].width(), images[0].height()) == (desc.width, desc.height)
                && positions.first().is_none_or(|p| *p == (0, 0));
            if !full {
                logwise::warn_sync!(
                    "Mipmapped texture {id} only takes one full-size image",
                    id = id
                );
                return;
            }
            let completed = self
                .gpu
                .as_ref()
                .map_or(0, |gpu| gpu.backend.completed_value(gpu.upload_fence.id()));
            let outstanding = self
                .textures
                .get(id)
                .is_some_and(|entry| entry.fence_value > completed);
            if outstanding {
                logwise::warn_sync!(
                    "Mipmapped texture {id} already has an upload in flight",
                    id = id
                );
                return;
            }
        }
        let Some(entry) = self.textures.get_mut(id) else {
            return;
        };
        let shadow = entry
            .shadow
            .get_or_insert_with(|| Image::filled(desc.width, desc.height, desc.upload_format, [0; 4]));
        let mut regions = Vec::new();
        for (i, image) in images.iter().enumerate() {
            let (x, y) = positions.get(i).copied().unwrap_or((0, 0));
            if x >= desc.width || y >= desc.height {
                logwise::warn_sync!(
                    "Upload to texture {id} starts outside it",
                    id = id
                );
                continue;
            }
            let source = if flags.already_premultiplied {
                premultiplied_view(image)
            } else {
                None
            };
            let converted = source.as_ref().unwrap_or(image).converted(desc.upload_format);
            shadow.blit(&converted, x, y);
            let width = converted.width().min(desc.width - x);
            let height = converted.height().min(desc.height - y);
            if width > 0 && height > 0 {
                regions.push((x, y, width, height));
            }
        }
        let (Some(gpu), Some(texture)) = (&mut self.gpu, &entry.gpu) else {
            // uploaded from the shadow once the image exists
            return;
        };
        let image = texture.image.id();
        let commands = regions
            .into_iter()
            .map(|(x, y, w, h)| upload_command(image, shadow, x, y, w, h))
            .collect();
        match submit_upload(gpu, commands) {
            Ok(value) => {
                entry.fence_value = value;
                entry.mips_pending = desc.mipmapped();
                logwise::trace_sync!(
                    "Texture {id} upload signals {value}",
                    id = id,
                    value = value
                );
            }
            Err(e) => report(&self.device, gpu.generation, "texture upload", &e),
        }
    }

    /**
    Resizes texture `id`, keeping the overlapping top-left content.

    Mipmapped textures can't be resized.  The copy runs on the transfer queue like an upload.
    */
    pub fn queue_texture_resize(&mut self, id: u32, size: (u32, u32)) {
        let (width, height) = size;
        let frame = self.frame;
        let Some(entry) = self.textures.get_mut(id) else {
            logwise::warn_sync!("Resize of unknown texture {id}", id = id);
            return;
        };
        let Some(mut desc) = entry.desc else {
            logwise::warn_sync!("Resize of texture {id}, which was never created", id = id);
            return;
        };
        if desc.mipmapped() || width == 0 || height == 0 {
            logwise::warn_sync!(
                "Texture {id} can't be resized to {width}x{height}",
                id = id,
                width = width,
                height = height
            );
            return;
        }
        let (old_width, old_height) = (desc.width, desc.height);
        desc.width = width;
        desc.height = height;
        entry.desc = Some(desc);
        if let Some(shadow) = &entry.shadow {
            entry.shadow = Some(shadow.resized_canvas(width, height));
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let Some(old) = entry.gpu.take() else {
            return;
        };
        let created = gpu.backend.create_image(&ImageDesc {
            label: "texture",
            width,
            height,
            format: desc.format,
            mip_levels: 1,
            samples: 1,
            usage: ImageUsage::Texture { mipmapped: false },
        });
        let new_image = match created {
            Ok(image) => Owned::new(&gpu.backend, image),
            Err(e) => {
                report(&self.device, gpu.generation, "texture resize", &e);
                gpu.retire(frame, Box::new(old.image));
                gpu.release(frame, Release::View(old.srv));
                return;
            }
        };
        let copy = Command::CopyImage {
            source: old.image.id(),
            target: new_image.id(),
            width: width.min(old_width),
            height: height.min(old_height),
        };
        match submit_upload(gpu, vec![copy]) {
            Ok(value) => entry.fence_value = value,
            Err(e) => report(&self.device, gpu.generation, "texture resize", &e),
        }
        gpu.descriptors.write(
            old.srv,
            ViewRecord {
                image: new_image.id(),
                view: ViewKind::Sampled,
            },
        );
        gpu.retire(frame, Box::new(old.image));
        entry.gpu = Some(TextureGpu {
            image: new_image,
            srv: old.srv,
        });
    }

    /// Releases texture `id`.  The image goes, and the ID is reused, once no frame can sample it.
    pub fn release_texture(&mut self, id: u32) {
        if self.textures.get(id).is_none() {
            logwise::warn_sync!("release_texture on unknown texture {id}", id = id);
            return;
        }
        self.retire_texture_gpu(id);
        if self.textures.mark_pending_release(id).is_none() {
            return;
        }
        match &mut self.gpu {
            Some(gpu) => gpu.release(self.frame, Release::Texture(id)),
            None => self.textures.free(id),
        }
    }

    /**
    Registers texture `id` for the next draw.

    The first command list that samples the texture after an upload waits for the upload on the
    GPU; pending mip generation is queued ahead of that list's draws.
    */
    pub fn use_texture(&mut self, id: u32) {
        if !self.recording("use_texture") {
            return;
        }
        let (Some(gpu), Some(entry)) = (&mut self.gpu, self.textures.get_mut(id)) else {
            logwise::warn_sync!("use_texture on unknown texture {id}", id = id);
            return;
        };
        let Some(texture) = &entry.gpu else {
            logwise::warn_sync!("Texture {id} has no image", id = id);
            return;
        };
        let Some(record) = gpu.descriptors.read(texture.srv) else {
            return;
        };
        let recording = &mut gpu.recording;
        if entry.fence_value > 0 {
            recording.upload_wait = recording.upload_wait.max(entry.fence_value);
        }
        if entry.mips_pending {
            recording.prologue.push(Command::GenerateMips {
                image: texture.image.id(),
            });
            entry.mips_pending = false;
        }
        recording.pending_textures.push(record);
    }

    pub fn texture_size(&self, id: u32) -> Option<(u32, u32)> {
        let desc = self.textures.get(id)?.desc?;
        Some((desc.width, desc.height))
    }

    pub fn texture_format(&self, id: u32) -> Option<TextureFormat> {
        Some(self.textures.get(id)?.desc?.format)
    }

    pub fn texture_mip_levels(&self, id: u32) -> Option<u32> {
        Some(self.textures.get(id)?.desc?.mip_levels)
    }

    /**
    Reads back one mip level of texture `id`.  Blocks until the GPU is idle.

    Pending mip generation is run first, so this also works for a texture that has not been drawn
    with since its upload.
    */
    pub fn read_texture_level(&mut self, id: u32, level: u32) -> Option<Image> {
        if !self.poll_device() {
            return None;
        }
        let entry = self.textures.get_mut(id)?;
        let desc = entry.desc?;
        if level >= desc.mip_levels {
            return None;
        }
        let image = entry.gpu.as_ref()?.image.id();
        if entry.mips_pending {
            entry.mips_pending = false;
            let gpu = self.gpu.as_mut()?;
            let mut submission =
                Submission::new(QueueKind::Main, vec![Command::GenerateMips { image }]);
            submission
                .waits
                .push((gpu.upload_fence.id(), entry.fence_value));
            if let Err(e) = gpu.backend.submit(submission) {
                report(&self.device, gpu.generation, "mip generation", &e);
                return None;
            }
        }
        self.wait_gpu();
        let gpu = self.gpu.as_ref()?;
        let data = match gpu.backend.read_image(image, level) {
            Ok(data) => data,
            Err(e) => {
                report(&self.device, gpu.generation, "texture readback", &e);
                return None;
            }
        };
        let (width, height) = mip_level_size(desc.width, desc.height, level);
        match Image::new(width, height, ImageFormat::for_texture(desc.format), data) {
            Ok(image) => Some(image),
            Err(e) => {
                logwise::warn_sync!("Texture readback: {e}", e = LogIt(&e));
                None
            }
        }
    }

    /// Moves texture `id`'s image and view into the deferred-delete queues.
    fn retire_texture_gpu(&mut self, id: u32) {
        let frame = self.frame;
        let Some(texture) = self.textures.get_mut(id).and_then(|entry| entry.gpu.take()) else {
            return;
        };
        if let Some(gpu) = &mut self.gpu {
            gpu.retire(frame, Box::new(texture.image));
            gpu.release(frame, Release::View(texture.srv));
        }
    }

    /// Recreates the images of every created texture from their shadows.
    pub(super) fn realize_textures(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        for (id, entry) in self.textures.iter_mut() {
            let Some(desc) = entry.desc else {
                continue;
            };
            match realize(gpu, &desc, entry.shadow.as_ref()) {
                Ok((texture, fence_value)) => {
                    entry.gpu = Some(texture);
                    entry.fence_value = fence_value;
                    entry.mips_pending = desc.mipmapped() && entry.shadow.is_some();
                }
                Err(e) => {
                    logwise::warn_sync!(
                        "Can't recreate texture {id}: {e}",
                        id = id,
                        e = LogIt(&e)
                    );
                }
            }
        }
    }
}
