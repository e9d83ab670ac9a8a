// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The per-surface engine.

An [Engine] is everything that belongs to one attached surface: the frame slots, the resource
pools, the descriptor heaps and the pipeline caches.  Only the [Device] is shared.

State is split in two.  *Logical* state (resource IDs, sizes, authoritative buffer contents, the
last pixels uploaded into each texture) lives directly in the engine and survives device loss.
*Device* state lives in [GpuState] and is thrown away wholesale when the device is lost; the next
[Engine::begin_frame] rebuilds it from the logical state.

The engine's operations are spread over child modules:

* `scheduler`: the frame bracket, layers, present and CPU waits
* `buffers`, `textures`, `render_targets`: the resource pools
* `drawing`: render state, pipelines and draws
* `readback`: synchronous readback and inspection
*/
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use logwise::privacy::LogIt;

use crate::bindings::descriptors::{
    BookkeepingHeaps, DescriptorHandle, DescriptorKind, GpuDescriptorHeap, ViewKind, ViewRecord,
};
use crate::bindings::resource_tracking::Registry;
use crate::config::EngineConfig;
use crate::images::device::{CreateError, Device, DeviceLossObserver};
use crate::images::pipeline::RootSignatureKey;
use crate::images::pipeline::PipelineState;
use crate::images::pipeline_cache::LruCache;
use crate::images::render_pass::{DrawingMode, Rect};
use crate::images::surface::{self, SurfaceBackend, SurfaceConfig};
use crate::images::view::View;
use crate::imp::{
    self, Backend, Command, FenceId, ImageDesc, ImageId, ImageUsage, LayoutId, Owned, PipelineId,
    Retirable,
};
use crate::multibuffer::Multibuffer;
use crate::pixel_formats::TextureFormat;
use crate::ring_buffer::RingBuffer;

mod buffers;
mod drawing;
mod readback;
mod render_targets;
mod scheduler;
mod textures;

use render_targets::RenderTargetEntry;
use textures::TextureEntry;

/// Counters describing what the engine did.  Cumulative over the engine's life.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_begun: u64,
    pub draws_recorded: u64,
    pub draws_skipped_empty_scissor: u64,
    /// Draws rejected because no usable pipeline or resource was bound.
    pub draws_rejected: u64,
    pub command_lists_submitted: u64,
    pub carry_forward_merges: u64,
    /// Carry-forwards that found the slot's object missing or resized and marked it fully dirty.
    pub carry_forward_invalidations: u64,
    pub pipeline_cache_hits: u64,
    pub pipeline_cache_misses: u64,
    pub pipeline_evictions: u64,
    pub root_signature_cache_hits: u64,
    pub root_signature_cache_misses: u64,
    pub root_signature_evictions: u64,
    pub gpu_heap_growths: u64,
    pub presents: u64,
    pub dropped_presents: u64,
    pub device_reinitializations: u64,
}

/// A backend failure while creating device objects.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct GpuError(imp::Error);

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AttachError {
    #[error("Engine is already attached to a surface")]
    AlreadyAttached,
    #[error("Can't attach to a {width}x{height} surface")]
    ZeroSize { width: u32, height: u32 },
    #[error("Can't open device {0}")]
    Device(#[from] CreateError),
    #[error("Can't create GPU resources {0}")]
    Gpu(#[from] GpuError),
}

#[derive(Debug, Default)]
struct LossFlag(AtomicBool);

impl DeviceLossObserver for LossFlag {
    fn device_lost(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct Attachment {
    view: View,
    width: u32,
    height: u32,
    scale: f64,
    samples: u32,
    wants_alpha: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameState {
    /// The frame being recorded, or the next one to begin.
    index: u64,
    in_frame: bool,
    layer_depth: u32,
    /// The frame was opened early by [Engine::begin_layer]; the caller's own `begin_frame` just
    /// joins it.
    opened_by_layer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Buffer(u32),
    Texture(u32),
    RenderTarget(u32),
    View(DescriptorHandle),
}

#[derive(Debug)]
struct FrameSlot {
    fence: Owned<FenceId>,
    /// What `fence` reaches once the slot's last frame retires.
    fence_value: u64,
    gpu_heap: GpuDescriptorHeap,
    retired: Vec<Box<dyn Retirable>>,
    releases: Vec<Release>,
    // released between frames; these join the normal queues when the slot's next frame begins
    out_of_frame_retired: Vec<Box<dyn Retirable>>,
    out_of_frame_releases: Vec<Release>,
    /// Buffers written while this slot was active.
    buffers_written: BTreeSet<u32>,
}

impl FrameSlot {
    fn new(backend: &Arc<dyn Backend>, heap_size: u32) -> Result<Self, imp::Error> {
        Ok(FrameSlot {
            fence: Owned::new(backend, backend.create_fence()?),
            fence_value: 0,
            gpu_heap: GpuDescriptorHeap::new(backend, heap_size)?,
            retired: Vec::new(),
            releases: Vec::new(),
            out_of_frame_retired: Vec::new(),
            out_of_frame_releases: Vec::new(),
            buffers_written: BTreeSet::new(),
        })
    }
}

/// The images a draw renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetState {
    /// 0 for the default target.
    id: u32,
    color: ImageId,
    depth: Option<ImageId>,
    samples: u32,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActivePipeline {
    pipeline: PipelineId,
    layout: LayoutId,
    texture_count: u32,
    topology: DrawingMode,
    stride: u32,
    samples: u32,
}

/// The command list being recorded for the active slot.
#[derive(Debug, Default)]
struct Recording {
    commands: Vec<Command>,
    /// Work that must run before `commands` in the same submission (mip generation).
    prologue: Vec<Command>,
    /// Upload fence value the next submission waits for; 0 for none.
    upload_wait: u64,
    draw_calls: u32,
    buffers_used: BTreeSet<u32>,
    target: Option<TargetState>,
    viewport: Rect,
    scissor: Option<Rect>,
    blend_factor: [f32; 4],
    stencil_ref: u32,
    active_pipeline: Option<ActivePipeline>,
    /// What `active_pipeline` was finalized from, to re-resolve it for a target with another
    /// sample count.
    pipeline_state: Option<PipelineState>,
    bound_pipeline: Option<PipelineId>,
    bound_layout: Option<LayoutId>,
    /// Views registered by `use_texture` for the next draw.
    pending_textures: Vec<ViewRecord>,
}

/// The surface's own render target.
#[derive(Debug)]
struct DefaultTarget {
    width: u32,
    height: u32,
    samples: u32,
    back_buffers: Vec<Owned<ImageId>>,
    /// Rendered into when multisampled, then resolved into the current back buffer.
    msaa: Option<Owned<ImageId>>,
    depth: Owned<ImageId>,
    rtvs: Vec<DescriptorHandle>,
    msaa_rtv: Option<DescriptorHandle>,
    dsv: DescriptorHandle,
}

impl DefaultTarget {
    fn new(
        backend: &Arc<dyn Backend>,
        descriptors: &mut BookkeepingHeaps,
        attachment: &Attachment,
        buffer_count: u32,
    ) -> Result<Self, imp::Error> {
        let (width, height, samples) = (attachment.width, attachment.height, attachment.samples);
        let image = |label: &'static str,
                     format: TextureFormat,
                     samples: u32,
                     usage: ImageUsage|
         -> Result<Owned<ImageId>, imp::Error> {
            let desc = ImageDesc {
                label,
                width,
                height,
                format,
                mip_levels: 1,
                samples,
                usage,
            };
            Ok(Owned::new(backend, backend.create_image(&desc)?))
        };
        let mut back_buffers = Vec::new();
        let mut rtvs = Vec::new();
        for _ in 0..buffer_count {
            let buffer = image(
                "back buffer",
                TextureFormat::Rgba8Unorm,
                1,
                ImageUsage::ColorTarget,
            )?;
            let rtv = descriptors.allocate(DescriptorKind::RenderTarget);
            descriptors.write(
                rtv,
                ViewRecord {
                    image: buffer.id(),
                    view: ViewKind::ColorTarget,
                },
            );
            back_buffers.push(buffer);
            rtvs.push(rtv);
        }
        let (msaa, msaa_rtv) = if samples > 1 {
            let msaa = image(
                "multisample color",
                TextureFormat::Rgba8Unorm,
                samples,
                ImageUsage::ColorTarget,
            )?;
            let rtv = descriptors.allocate(DescriptorKind::RenderTarget);
            descriptors.write(
                rtv,
                ViewRecord {
                    image: msaa.id(),
                    view: ViewKind::ColorTarget,
                },
            );
            (Some(msaa), Some(rtv))
        } else {
            (None, None)
        };
        let depth = image(
            "depth stencil",
            TextureFormat::Depth24Stencil8,
            samples,
            ImageUsage::DepthStencil,
        )?;
        let dsv = descriptors.allocate(DescriptorKind::DepthStencil);
        descriptors.write(
            dsv,
            ViewRecord {
                image: depth.id(),
                view: ViewKind::DepthStencil,
            },
        );
        Ok(DefaultTarget {
            width,
            height,
            samples,
            back_buffers,
            msaa,
            depth,
            rtvs,
            msaa_rtv,
            dsv,
        })
    }

    fn back_buffer(&self, present_index: u64) -> Option<ImageId> {
        let count = self.back_buffers.len() as u64;
        if count == 0 {
            return None;
        }
        self.back_buffers
            .get((present_index % count) as usize)
            .map(Owned::id)
    }

    /// Where draws to target 0 land this frame.
    fn render_view(&self, present_index: u64) -> Option<DescriptorHandle> {
        if self.msaa_rtv.is_some() {
            return self.msaa_rtv;
        }
        let count = self.rtvs.len() as u64;
        self.rtvs.get((present_index % count.max(1)) as usize).copied()
    }

    fn release_views(&self, descriptors: &mut BookkeepingHeaps) {
        for rtv in self.rtvs.iter().chain(self.msaa_rtv.iter()) {
            descriptors.release(*rtv);
        }
        descriptors.release(self.dsv);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    state: PipelineState,
    samples: u32,
}

#[derive(Debug)]
struct CachedPipeline {
    pipeline: Owned<PipelineId>,
    layout: Arc<Owned<LayoutId>>,
}

/// Everything that dies with the device.
#[derive(Debug)]
struct GpuState {
    backend: Arc<dyn Backend>,
    generation: u64,
    surface: Box<dyn SurfaceBackend>,
    slots: RingBuffer<FrameSlot>,
    default_target: DefaultTarget,
    /// For explicit CPU waits.
    global_fence: Owned<FenceId>,
    global_fence_value: u64,
    /// Signaled by the transfer queue.
    upload_fence: Owned<FenceId>,
    upload_fence_value: u64,
    descriptors: BookkeepingHeaps,
    pipelines: LruCache<PipelineKey, CachedPipeline>,
    root_signatures: LruCache<RootSignatureKey, Arc<Owned<LayoutId>>>,
    recording: Recording,
}

impl GpuState {
    fn new(
        backend: Arc<dyn Backend>,
        generation: u64,
        attachment: &Attachment,
        config: &EngineConfig,
    ) -> Result<Self, imp::Error> {
        let slots = RingBuffer::try_new(config.frames_in_flight, |_| {
            FrameSlot::new(&backend, config.gpu_descriptor_heap_size)
        })?;
        let global_fence = Owned::new(&backend, backend.create_fence()?);
        let upload_fence = Owned::new(&backend, backend.create_fence()?);
        let mut descriptors = BookkeepingHeaps::default();
        let surface = surface::select(
            &backend,
            attachment.view.handles(),
            &SurfaceConfig {
                width: attachment.width,
                height: attachment.height,
                buffer_count: config.swap_chain_buffer_count,
                wants_alpha: attachment.wants_alpha,
                max_latency: config.waitable_swap_chain_max_latency,
            },
        )?;
        let default_target = DefaultTarget::new(
            &backend,
            &mut descriptors,
            attachment,
            config.swap_chain_buffer_count,
        )?;
        Ok(GpuState {
            backend,
            generation,
            surface,
            slots,
            default_target,
            global_fence,
            global_fence_value: 0,
            upload_fence,
            upload_fence_value: 0,
            descriptors,
            pipelines: LruCache::new(config.max_cached_pipelines),
            root_signatures: LruCache::new(config.max_cached_root_signatures),
            recording: Recording::default(),
        })
    }

    /**
    Queues `object` for destruction once no frame can reference it.

    Inside a frame it joins the active slot's queue.  Between frames it goes to the out-of-frame
    queue of the slot the next frame will use, which holds it for one more cycle.
    */
    fn retire(&mut self, frame: FrameState, object: Box<dyn Retirable>) {
        if frame.in_frame {
            self.slots.active_mut().retired.push(object);
        } else {
            let index = self.slots.slot_for_frame(frame.index);
            if let Some(slot) = self.slots.get_mut(index) {
                slot.out_of_frame_retired.push(object);
            }
        }
    }

    /// Like [Self::retire], for IDs and bookkeeping views.
    fn release(&mut self, frame: FrameState, release: Release) {
        if frame.in_frame {
            self.slots.active_mut().releases.push(release);
        } else {
            let index = self.slots.slot_for_frame(frame.index);
            if let Some(slot) = self.slots.get_mut(index) {
                slot.out_of_frame_releases.push(release);
            }
        }
    }

    /// Frames whose GPU work has finished.
    fn completed_frames(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| self.backend.completed_value(slot.fence.id()))
            .max()
            .unwrap_or(0)
    }

    fn view_image(&self, handle: DescriptorHandle) -> Option<ImageId> {
        self.descriptors.read(handle).map(|record| record.image)
    }
}

/**
Logs a backend failure.  Device loss is reported to the device, whose observers flag every
engine; the engine notices on its next operation.
*/
fn report(device: &Device, generation: u64, what: &'static str, error: &imp::Error) {
    if error.is_device_lost() {
        device.device_loss_detected(generation);
    } else {
        logwise::warn_sync!(
            "{what} failed: {error}",
            what = what,
            error = LogIt(error)
        );
    }
}

/**
The GPU command and resource engine for one surface.

Create one with [Engine::new], then [Engine::attach] it.  Resource IDs are plain `u32`s; 0 is never
a valid ID (and means "the default target" where a render target is expected).  Operations
never panic and never return backend errors: failures are logged and leave the affected
resource unusable, see the crate documentation.
*/
#[derive(Debug)]
pub struct Engine {
    // dropped first, so device objects go before the pools that reference them
    gpu: Option<GpuState>,
    device: Arc<Device>,
    config: EngineConfig,
    loss: Arc<LossFlag>,
    attachment: Option<Attachment>,
    buffers: Registry<Multibuffer>,
    textures: Registry<TextureEntry>,
    render_targets: Registry<RenderTargetEntry>,
    frame: FrameState,
    present_index: u64,
    /// Device objects were released because of a loss and have not been rebuilt yet.
    recovering: bool,
    stats: FrameStats,
}

impl Engine {
    pub fn new(device: Arc<Device>, config: EngineConfig) -> Self {
        let config = config.sanitized();
        let loss = Arc::new(LossFlag::default());
        let weak = Arc::downgrade(&loss);
        let observer: Weak<dyn DeviceLossObserver> = weak;
        device.register_loss_observer(observer);
        logwise::info_sync!(
            "Engine created with {frames} frames in flight",
            frames = config.frames_in_flight
        );
        Engine {
            gpu: None,
            device,
            config,
            loss,
            attachment: None,
            buffers: Registry::default(),
            textures: Registry::default(),
            render_targets: Registry::default(),
            frame: FrameState::default(),
            present_index: 0,
            recovering: false,
            stats: FrameStats::default(),
        }
    }

    /**
    Attaches to a surface and creates the device objects.

    `size` is in pixels.  `samples` is the multisample count of the default target; unsupported
    counts are rounded down to a power of two no larger than 8.
    */
    pub fn attach(
        &mut self,
        view: View,
        size: (u32, u32),
        scale: f64,
        samples: u32,
        wants_alpha: bool,
    ) -> Result<(), AttachError> {
        if self.attachment.is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        let (width, height) = size;
        if width == 0 || height == 0 {
            return Err(AttachError::ZeroSize { width, height });
        }
        self.attachment = Some(Attachment {
            view,
            width,
            height,
            scale,
            samples: supported_samples(samples),
            wants_alpha,
        });
        if let Err(e) = self.build_gpu() {
            self.attachment = None;
            self.gpu = None;
            return Err(e);
        }
        logwise::info_sync!(
            "Attached to a {width}x{height} surface",
            width = width,
            height = height
        );
        Ok(())
    }

    /// Waits for the GPU and destroys every device object.  Logical resources are kept; a later
    /// [Self::attach] recreates them.
    pub fn release(&mut self) {
        if self.frame.in_frame {
            logwise::warn_sync!("Releasing the engine inside a frame; the frame is discarded");
        }
        if self.poll_device() {
            self.wait_gpu();
        }
        if let Some(gpu) = self.gpu.take() {
            self.drop_device_state(gpu);
        }
        self.attachment = None;
        self.recovering = false;
        logwise::info_sync!("Engine released");
    }

    /// Resizes the default target.  Waits for the GPU.
    pub fn resize(&mut self, size: (u32, u32), scale: f64) {
        let (width, height) = size;
        if width == 0 || height == 0 {
            logwise::warn_sync!(
                "Ignoring resize to {width}x{height}",
                width = width,
                height = height
            );
            return;
        }
        let Some(attachment) = &mut self.attachment else {
            logwise::warn_sync!("Resize before attach");
            return;
        };
        attachment.width = width;
        attachment.height = height;
        attachment.scale = scale;
        if !self.poll_device() {
            // the rebuild picks the new size up
            return;
        }
        if self.frame.in_frame {
            logwise::warn_sync!("Resizing inside a frame; ending it first");
            self.end_frame();
        }
        self.wait_gpu();
        let (Some(gpu), Some(attachment)) = (&mut self.gpu, &self.attachment) else {
            return;
        };
        if let Err(e) = gpu.surface.resize(width, height) {
            report(&self.device, gpu.generation, "surface resize", &e);
        }
        match DefaultTarget::new(
            &gpu.backend,
            &mut gpu.descriptors,
            attachment,
            self.config.swap_chain_buffer_count,
        ) {
            Ok(target) => {
                let old = std::mem::replace(&mut gpu.default_target, target);
                old.release_views(&mut gpu.descriptors);
                // the GPU is idle, so the old images can go right away
                drop(old);
                logwise::info_sync!(
                    "Resized to {width}x{height}",
                    width = width,
                    height = height
                );
            }
            Err(e) => report(&self.device, gpu.generation, "default target resize", &e),
        }
    }

    /// `false` once the device is lost, until the next frame rebuilds everything.
    pub fn has_resources(&self) -> bool {
        self.gpu
            .as_ref()
            .is_some_and(|gpu| !self.loss.0.load(Ordering::Acquire) && !gpu.backend.is_lost())
    }

    /// Loses the device on purpose and releases every device object, as a real loss would.
    pub fn simulate_device_loss(&mut self) {
        self.device.simulate_device_loss();
        self.poll_device();
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// F, the number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    /// The frame being recorded, or the next one to begin.
    pub fn frame_index(&self) -> u64 {
        self.frame.index
    }

    /// Number of [Self::present] calls so far.
    pub fn present_index(&self) -> u64 {
        self.present_index
    }

    pub fn is_in_frame(&self) -> bool {
        self.frame.in_frame
    }

    pub fn stats(&self) -> FrameStats {
        self.stats.clone()
    }

    /// Size of the attached surface in pixels.
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.attachment.as_ref().map(|a| (a.width, a.height))
    }

    pub fn scale_factor(&self) -> Option<f64> {
        self.attachment.as_ref().map(|a| a.scale)
    }

    /**
    Checks for device loss.  After a loss every device object is released, the frame is
    abandoned, and `false` is returned.  `true` when device state is present and usable.
    */
    fn poll_device(&mut self) -> bool {
        let Some(gpu) = &self.gpu else {
            return false;
        };
        let flagged = self.loss.0.swap(false, Ordering::AcqRel);
        let backend_lost = gpu.backend.is_lost();
        if !flagged && !backend_lost && self.device.generation() == gpu.generation {
            return true;
        }
        if backend_lost {
            self.device.device_loss_detected(gpu.generation);
        }
        self.release_device_resources();
        false
    }

    /// Like [Self::poll_device], rebuilding device state first if it is missing.
    fn ensure_gpu(&mut self) -> bool {
        if self.poll_device() {
            return true;
        }
        if self.attachment.is_none() {
            return false;
        }
        match self.build_gpu() {
            Ok(()) => {
                if self.recovering {
                    self.recovering = false;
                    self.stats.device_reinitializations += 1;
                    logwise::info_sync!("Engine resources recreated after device loss");
                }
                true
            }
            Err(e) => {
                logwise::warn_sync!(
                    "Can't recreate device objects: {e}",
                    e = LogIt(&e)
                );
                false
            }
        }
    }

    fn build_gpu(&mut self) -> Result<(), AttachError> {
        let Some(attachment) = &self.attachment else {
            return Ok(());
        };
        let (backend, generation) = self.device.active_backend()?;
        // any loss reported so far concerns an older generation
        self.loss.0.store(false, Ordering::Release);
        let mut gpu = match GpuState::new(backend, generation, attachment, &self.config) {
            Ok(gpu) => gpu,
            Err(e) => {
                if e.is_device_lost() {
                    self.device.device_loss_detected(generation);
                }
                return Err(GpuError(e).into());
            }
        };
        // a rebuilt ring picks up where the frame sequence is
        gpu.slots.select(self.frame.index);
        self.gpu = Some(gpu);
        self.frame.in_frame = false;
        self.frame.layer_depth = 0;
        self.frame.opened_by_layer = false;
        self.realize_textures();
        self.realize_render_targets();
        Ok(())
    }

    fn release_device_resources(&mut self) {
        let Some(gpu) = self.gpu.take() else {
            return;
        };
        logwise::warn_sync!(
            "Releasing device objects of generation {generation}",
            generation = gpu.generation
        );
        self.drop_device_state(gpu);
        self.frame.in_frame = false;
        self.frame.layer_depth = 0;
        self.frame.opened_by_layer = false;
        self.recovering = true;
    }

    /// Frees pending IDs and forgets every device object, keeping logical state.
    fn drop_device_state(&mut self, mut gpu: GpuState) {
        for slot in gpu.slots.iter_mut() {
            let releases: Vec<Release> = slot
                .releases
                .drain(..)
                .chain(slot.out_of_frame_releases.drain(..))
                .collect();
            for release in releases {
                self.free_id(release);
            }
        }
        drop(gpu);
        for (_, buffer) in self.buffers.iter_mut() {
            buffer.drop_backings();
        }
        for (_, texture) in self.textures.iter_mut() {
            texture.gpu = None;
        }
        for (_, target) in self.render_targets.iter_mut() {
            target.gpu = None;
        }
    }

    /// The last step of releasing a resource: its ID becomes reusable.  Views are freed by the
    /// caller, which owns the heaps.
    fn free_id(&mut self, release: Release) {
        match release {
            Release::Buffer(id) => self.buffers.free(id),
            Release::Texture(id) => self.textures.free(id),
            Release::RenderTarget(id) => self.render_targets.free(id),
            Release::View(_) => {}
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.poll_device() {
            self.wait_gpu();
        }
    }
}

fn supported_samples(samples: u32) -> u32 {
    match samples {
        0 | 1 => 1,
        2 | 3 => 2,
        4..=7 => 4,
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::supported_samples;

    #[test]
    fn sample_counts() {
        assert_eq!(supported_samples(0), 1);
        assert_eq!(supported_samples(3), 2);
        assert_eq!(supported_samples(4), 4);
        assert_eq!(supported_samples(16), 8);
    }
}
