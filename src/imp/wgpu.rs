// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The wgpu backend.

wgpu has one queue, so both [QueueKind]s land on it in submission order and GPU-side fence waits
are satisfied by ordering alone.  Fences are counters advanced from
`Queue::on_submitted_work_done`; a dedicated poll thread, woken after every submission, drives
those callbacks.

Descriptor heaps have no wgpu counterpart.  They are CPU arrays of view records, and a bind group
is built from the bound range at draw time.
*/
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use logwise::privacy::LogIt;

use crate::bindings::descriptors::ViewRecord;
use crate::bittricks::{aligned_size, mip_level_size};
use crate::images::pipeline::{PipelineState, RootSignatureKey};
use crate::images::surface::{SurfaceBackend, SurfaceConfig};
use crate::images::view::NativeHandles;
use crate::imp::{
    Backend, Error, FenceId, GpuObject, HeapId, ImageDesc, ImageId, ImageUsage, LayoutId,
    MemoryId, PipelineId, QueueKind, Submission,
};
use crate::pixel_formats::TextureFormat;

mod blit;
mod entry_point;
mod interpreter;
mod mips;
mod pipelines;
mod surface;

use blit::Blitter;
use mips::MipGenerator;
pub(crate) use entry_point::WgpuEntryPoint;
use pipelines::{LayoutEntry, PipelineEntry};

/// A counter the CPU can block on.
#[derive(Debug, Default)]
struct Fence {
    value: Mutex<u64>,
    reached: Condvar,
}

impl Fence {
    fn value(&self) -> u64 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, value: u64) {
        let mut current = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *current = (*current).max(value);
        self.reached.notify_all();
    }
}

#[derive(Debug)]
struct ImageEntry {
    texture: wgpu::Texture,
    desc: ImageDesc,
}

/// A buffer plus the CPU mirror that lets unaligned writes be widened to wgpu's copy alignment.
#[derive(Debug)]
struct MemoryEntry {
    buffer: wgpu::Buffer,
    mirror: Vec<u8>,
}

#[derive(Debug, Default)]
struct Objects {
    next_id: u64,
    memories: HashMap<u64, MemoryEntry>,
    images: HashMap<u64, ImageEntry>,
    layouts: HashMap<u64, LayoutEntry>,
    pipelines: HashMap<u64, PipelineEntry>,
    heaps: HashMap<u64, Vec<Option<ViewRecord>>>,
    fences: HashMap<u64, Arc<Fence>>,
}

impl Objects {
    fn insert_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn image(&self, image: ImageId) -> Result<&ImageEntry, Error> {
        self.images
            .get(&image.0)
            .ok_or_else(|| Error::Validation(format!("unknown image {}", image.0)))
    }

    fn memory(&self, memory: MemoryId) -> Result<&MemoryEntry, Error> {
        self.memories
            .get(&memory.0)
            .ok_or_else(|| Error::Validation(format!("unknown memory {}", memory.0)))
    }
}

/// Wakes the poll thread after submissions so completion callbacks run.
#[derive(Debug)]
struct Poller {
    trigger: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    fn spawn(device: wgpu::Device) -> Result<Self, Error> {
        let (trigger, receiver): (Sender<()>, Receiver<()>) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("wgpu_poll".to_string())
            .spawn(move || {
                // exits when the sender is dropped
                while receiver.recv().is_ok() {
                    let _ = device.poll(wgpu::PollType::Wait);
                }
            })
            .map_err(|e| Error::ResourceCreation(format!("poll thread: {e}")))?;
        Ok(Poller {
            trigger: Mutex::new(Some(trigger)),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn wake(&self) {
        if let Some(trigger) = &*self.trigger.lock().unwrap_or_else(PoisonError::into_inner) {
            let _ = trigger.send(());
        }
    }

    fn shutdown(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

/// Everything the backend, its surfaces and its callbacks share.
struct Shared {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    objects: Mutex<Objects>,
    lost: AtomicBool,
    lost_callback: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    poller: Poller,
    blitter: Blitter,
    mips: MipGenerator,
    /// Bound as the constant buffer of draws that have none.
    empty_constants: wgpu::Buffer,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("adapter", &self.adapter.get_info().name)
            .field("lost", &self.lost.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn objects(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(&self) -> Result<(), Error> {
        if self.lost.load(Ordering::Acquire) {
            Err(Error::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn mark_lost(&self) {
        if self.lost.swap(true, Ordering::AcqRel) {
            return;
        }
        // wake CPU waiters so they notice
        for fence in self.objects().fences.values() {
            fence.reached.notify_all();
        }
        let callback = self
            .lost_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Runs `f` inside validation and out-of-memory error scopes.
    fn scoped<R>(&self, what: &str, f: impl FnOnce() -> R) -> Result<R, Error> {
        self.live()?;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f();
        let validation = test_executors::sleep_on(self.device.pop_error_scope());
        let out_of_memory = test_executors::sleep_on(self.device.pop_error_scope());
        if let Some(e) = out_of_memory {
            return Err(Error::ResourceCreation(format!("{what}: {e}")));
        }
        if let Some(e) = validation {
            return Err(Error::Validation(format!("{what}: {e}")));
        }
        self.live()?;
        Ok(result)
    }

    /// Copies `copy` into a mappable buffer of `size` bytes and returns its content.
    fn read_back(
        &self,
        size: u64,
        copy: impl FnOnce(&mut wgpu::CommandEncoder, &wgpu::Buffer),
    ) -> Result<Vec<u8>, Error> {
        let staging = self.scoped("readback buffer", || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback"),
            });
        copy(&mut encoder, &staging);
        self.queue.submit([encoder.finish()]);
        let (sender, receiver) = r#continue::continuation();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| sender.send(result));
        self.poller.wake();
        let mapped = test_executors::sleep_on(receiver);
        if let Err(e) = mapped {
            return Err(Error::Map(e.to_string()));
        }
        let data = staging.slice(..).get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}

/**
A wgpu device.  Objects are referred to by the opaque IDs of the backend seam.
*/
#[derive(Debug)]
pub(crate) struct WgpuBackend {
    shared: Arc<Shared>,
}

impl WgpuBackend {
    fn new(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Result<Self, Error> {
        let poller = Poller::spawn(device.clone())?;
        let blitter = Blitter::new(&device);
        let mips = MipGenerator::new(&device);
        let empty_constants = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("empty constants"),
            size: 256,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        });
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let lost = weak.clone();
            device.set_device_lost_callback(move |reason, message| {
                logwise::error_sync!(
                    "wgpu device lost ({reason}): {message}",
                    reason = LogIt(&reason),
                    message = LogIt(&message)
                );
                if let Some(shared) = lost.upgrade() {
                    shared.mark_lost();
                }
            });
            device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
                logwise::warn_sync!("wgpu error: {e}", e = LogIt(&e));
            }));
            Shared {
                instance,
                adapter,
                device,
                queue,
                objects: Mutex::new(Objects::default()),
                lost: AtomicBool::new(false),
                lost_callback: Mutex::new(None),
                poller,
                blitter,
                mips,
                empty_constants,
            }
        });
        Ok(WgpuBackend { shared })
    }

    fn insert<T>(&self, f: impl FnOnce(&mut Objects, u64) -> T) -> u64 {
        let mut objects = self.shared.objects();
        let id = objects.insert_id();
        f(&mut objects, id);
        id
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.shared.poller.shutdown();
    }
}

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Depth24Stencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

fn texture_usage(usage: ImageUsage, samples: u32) -> wgpu::TextureUsages {
    use wgpu::TextureUsages as U;
    match usage {
        ImageUsage::Texture { mipmapped: false } => {
            U::TEXTURE_BINDING | U::COPY_DST | U::COPY_SRC
        }
        // mip levels are written by a compute pass
        ImageUsage::Texture { mipmapped: true } => {
            U::TEXTURE_BINDING | U::COPY_DST | U::COPY_SRC | U::STORAGE_BINDING
        }
        ImageUsage::ColorTarget if samples > 1 => U::RENDER_ATTACHMENT,
        ImageUsage::ColorTarget => {
            U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST
        }
        ImageUsage::DepthStencil => U::RENDER_ATTACHMENT,
    }
}

impl Backend for WgpuBackend {
    fn create_memory(&self, size: u64, label: &'static str) -> Result<MemoryId, Error> {
        let padded = aligned_size(size.max(4), wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.shared.scoped("create_memory", || {
            self.shared.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: padded,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        })?;
        let entry = MemoryEntry {
            buffer,
            mirror: vec![0; padded as usize],
        };
        Ok(MemoryId(self.insert(|objects, id| {
            objects.memories.insert(id, entry)
        })))
    }

    fn write_memory(&self, memory: MemoryId, writes: &[(u64, &[u8])]) -> Result<(), Error> {
        self.shared.live()?;
        let mut objects = self.shared.objects();
        let entry = objects
            .memories
            .get_mut(&memory.0)
            .ok_or_else(|| Error::Validation(format!("unknown memory {}", memory.0)))?;
        for &(offset, bytes) in writes {
            let start = offset as usize;
            let end = start + bytes.len();
            if end > entry.mirror.len() {
                return Err(Error::Validation("write past the end of a memory object".into()));
            }
            entry.mirror[start..end].copy_from_slice(bytes);
            let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
            let aligned_start = start / align * align;
            let aligned_end = end.div_ceil(align) * align;
            self.shared.queue.write_buffer(
                &entry.buffer,
                aligned_start as u64,
                &entry.mirror[aligned_start..aligned_end],
            );
        }
        Ok(())
    }

    fn read_memory(&self, memory: MemoryId) -> Result<Vec<u8>, Error> {
        let buffer = self.shared.objects().memory(memory)?.buffer.clone();
        let size = buffer.size();
        self.shared.read_back(size, |encoder, staging| {
            encoder.copy_buffer_to_buffer(&buffer, 0, staging, 0, size);
        })
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageId, Error> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::ResourceCreation("zero-sized image".to_owned()));
        }
        let texture = self.shared.scoped("create_image", || {
            self.shared.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: desc.mip_levels.max(1),
                sample_count: desc.samples,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage: texture_usage(desc.usage, desc.samples),
                view_formats: &[],
            })
        })?;
        let entry = ImageEntry {
            texture,
            desc: desc.clone(),
        };
        Ok(ImageId(self.insert(|objects, id| objects.images.insert(id, entry))))
    }

    fn read_image(&self, image: ImageId, level: u32) -> Result<Vec<u8>, Error> {
        let (texture, desc) = {
            let objects = self.shared.objects();
            let entry = objects.image(image)?;
            (entry.texture.clone(), entry.desc.clone())
        };
        if level >= desc.mip_levels || desc.samples > 1 {
            return Err(Error::Validation(format!("can't read level {level} of this image")));
        }
        let (width, height) = mip_level_size(desc.width, desc.height, level);
        let bpp = desc.format.bytes_per_pixel() as u32;
        let row = width * bpp;
        let padded_row = aligned_size(row as u64, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64) as u32;
        let data = self
            .shared
            .read_back(padded_row as u64 * height as u64, |encoder, staging| {
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: level,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: staging,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(padded_row),
                            rows_per_image: Some(height),
                        },
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            })?;
        let mut packed = Vec::with_capacity((row * height) as usize);
        for r in 0..height as usize {
            let start = r * padded_row as usize;
            packed.extend_from_slice(&data[start..start + row as usize]);
        }
        Ok(packed)
    }

    fn create_layout(&self, key: &RootSignatureKey) -> Result<LayoutId, Error> {
        let entry = self
            .shared
            .scoped("create_layout", || LayoutEntry::new(&self.shared.device, key))?;
        Ok(LayoutId(self.insert(|objects, id| objects.layouts.insert(id, entry))))
    }

    fn create_pipeline(
        &self,
        layout: LayoutId,
        state: &PipelineState,
        samples: u32,
    ) -> Result<PipelineId, Error> {
        let pipeline_layout = self
            .shared
            .objects()
            .layouts
            .get(&layout.0)
            .map(|entry| entry.pipeline_layout.clone())
            .ok_or_else(|| Error::Validation(format!("unknown layout {}", layout.0)))?;
        let entry = self.shared.scoped("create_pipeline", || {
            PipelineEntry::new(&self.shared.device, &pipeline_layout, layout, state, samples)
        })?;
        Ok(PipelineId(self.insert(|objects, id| objects.pipelines.insert(id, entry))))
    }

    fn create_heap(&self, capacity: u32) -> Result<HeapId, Error> {
        self.shared.live()?;
        Ok(HeapId(self.insert(|objects, id| {
            objects.heaps.insert(id, vec![None; capacity as usize])
        })))
    }

    fn create_fence(&self) -> Result<FenceId, Error> {
        self.shared.live()?;
        Ok(FenceId(self.insert(|objects, id| {
            objects.fences.insert(id, Arc::new(Fence::default()))
        })))
    }

    fn destroy(&self, object: GpuObject) {
        let mut objects = self.shared.objects();
        match object {
            GpuObject::Memory(m) => {
                if let Some(entry) = objects.memories.remove(&m.0) {
                    entry.buffer.destroy();
                }
            }
            GpuObject::Image(i) => {
                if let Some(entry) = objects.images.remove(&i.0) {
                    entry.texture.destroy();
                }
            }
            GpuObject::Layout(l) => {
                objects.layouts.remove(&l.0);
            }
            GpuObject::Pipeline(p) => {
                objects.pipelines.remove(&p.0);
            }
            GpuObject::Heap(h) => {
                objects.heaps.remove(&h.0);
            }
            GpuObject::Fence(f) => {
                objects.fences.remove(&f.0);
            }
        }
    }

    fn submit(&self, submission: Submission) -> Result<(), Error> {
        self.shared.live()?;
        let label = match submission.queue {
            QueueKind::Main => "main",
            QueueKind::Transfer => "transfer",
        };
        let signal = match submission.signal {
            Some((fence, value)) => {
                let fence = self.shared.objects().fences.get(&fence.0).cloned();
                fence.map(|fence| (fence, value))
            }
            None => None,
        };
        // one queue: anything waited for was submitted earlier and has been ordered before us
        let result = self.shared.scoped(label, || {
            let buffer = {
                let mut objects = self.shared.objects();
                interpreter::record(&self.shared, &mut objects, label, submission.commands)?
            };
            self.shared.queue.submit([buffer]);
            Ok(())
        });
        // the fence moves on even if the commands were rejected
        if let Some((fence, value)) = signal {
            self.shared
                .queue
                .on_submitted_work_done(move || fence.signal(value));
        }
        self.shared.poller.wake();
        result?
    }

    fn completed_value(&self, fence: FenceId) -> u64 {
        self.shared
            .objects()
            .fences
            .get(&fence.0)
            .map_or(0, |fence| fence.value())
    }

    fn wait_fence(&self, fence: FenceId, value: u64) -> Result<(), Error> {
        let fence = self
            .shared
            .objects()
            .fences
            .get(&fence.0)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("unknown fence {}", fence.0)))?;
        self.shared.poller.wake();
        let mut current = fence.value.lock().unwrap_or_else(PoisonError::into_inner);
        while *current < value {
            self.shared.live()?;
            let (guard, _) = fence
                .reached
                .wait_timeout(current, Duration::from_millis(100))
                .unwrap_or_else(PoisonError::into_inner);
            current = guard;
        }
        Ok(())
    }

    fn create_surface(
        &self,
        handles: Option<&NativeHandles>,
        config: &SurfaceConfig,
    ) -> Result<Option<Box<dyn SurfaceBackend>>, Error> {
        let Some(handles) = handles else {
            return Ok(None);
        };
        let surface = surface::WgpuSurface::new(self.shared.clone(), handles, config)?;
        Ok(Some(Box::new(surface)))
    }

    fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Acquire)
    }

    fn set_device_lost_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        *self
            .shared
            .lost_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(callback));
    }

    fn simulate_device_loss(&self) {
        logwise::warn_sync!("Destroying the wgpu device to simulate a loss");
        self.shared.device.destroy();
        self.shared.mark_lost();
    }
}

