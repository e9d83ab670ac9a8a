// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A software backend.

Memory objects are `Vec<u8>`, images are a `Vec<u8>` per mip level (multisampled images store one
sample), and fences are counters.  Commands are interpreted on the CPU: clears, uploads, copies,
resolves and mip generation really happen; draws are not rasterized but are recorded with the
state and data they would have seen, see [DrawRecord].

By default submissions execute as soon as they are submitted.  In *manual* mode they queue up
until [HeadlessControl::complete_all], [HeadlessControl::complete_main_submissions], or a CPU wait
on a fence drains them, which is how tests observe frames actually being in flight.  A submission
that waits on a fence drains the other queue until the wait is satisfied; a wait that can never be
satisfied is a validation error.

[HeadlessControl] is the test-side handle: it injects failures, switches modes, and exposes
statistics.  It survives device loss: reopening the backend after a loss starts a new generation
of the same shared state, and objects of the old generation are gone.
*/
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use logwise::privacy::LogIt;

use crate::bindings::descriptors::ViewRecord;
use crate::bittricks::mip_level_size;
use crate::images::pipeline::{PipelineState, RootSignatureKey};
use crate::images::render_pass::{IndexFormat, Rect};
use crate::images::surface::{SurfaceBackend, SurfaceConfig};
use crate::images::view::NativeHandles;
use crate::imp::{
    Backend, Command, Error, FenceId, GpuObject, HeapId, ImageDesc, ImageId, LayoutId, MemoryId,
    PipelineId, QueueKind, Submission,
};
use crate::pixel_formats::{Image, ImageFormat, TextureFormat};

/// Counters kept by the headless backend.  They are cumulative across device loss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub memories_created: u64,
    pub images_created: u64,
    pub layouts_created: u64,
    pub pipelines_created: u64,
    pub heaps_created: u64,
    pub objects_destroyed: u64,
    pub main_submissions: u64,
    pub transfer_submissions: u64,
    /// Successful [Backend::write_memory] calls (one map/unmap each).
    pub memory_writes: u64,
    pub bytes_written: u64,
    pub pipeline_binds: u64,
    pub layout_binds: u64,
    pub draws: u64,
    pub uploads: u64,
    pub mip_generations: u64,
    pub resolves: u64,
    pub presents: u64,
    pub failed_presents: u64,
}

/// A texture as a draw saw it: every mip level, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawTexture {
    pub image: u64,
    pub levels: Vec<Vec<u8>>,
}

/// Everything a draw would have consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: u64,
    pub pipeline: u64,
    pub layout: u64,
    pub state: PipelineState,
    pub root_signature: RootSignatureKey,
    pub samples: u32,
    pub viewport: Rect,
    pub scissor: Option<Rect>,
    pub blend_factor: [f32; 4],
    pub stencil_ref: u32,
    pub count: u32,
    pub first_index: Option<u32>,
    /// Vertex memory from the bound offset to the end of the bound range.
    pub vertex_data: Vec<u8>,
    pub index_data: Option<Vec<u8>>,
    /// Constant memory from the bound offset to the end of the object.
    pub constant_data: Vec<u8>,
    pub textures: Vec<DrawTexture>,
}

/// The synchronization a submission carried, recorded when it was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub transfer: bool,
    /// `(fence, value)` pairs the queue waits for before running the commands.
    pub waits: Vec<(u64, u64)>,
    pub signal: Option<(u64, u64)>,
    pub commands: usize,
}

#[derive(Debug)]
struct HeadlessImage {
    desc: ImageDesc,
    levels: Vec<Vec<u8>>,
}

impl HeadlessImage {
    fn level_size(&self, level: u32) -> (u32, u32) {
        mip_level_size(self.desc.width, self.desc.height, level)
    }
}

#[derive(Debug)]
struct PipelineRecord {
    layout: LayoutId,
    state: PipelineState,
    samples: u32,
}

#[derive(Debug, Default)]
struct State {
    generation: u64,
    manual: bool,
    lost: bool,
    next_id: u64,
    memories: HashMap<u64, Vec<u8>>,
    images: HashMap<u64, HeadlessImage>,
    layouts: HashMap<u64, RootSignatureKey>,
    pipelines: HashMap<u64, PipelineRecord>,
    heaps: HashMap<u64, Vec<Option<ViewRecord>>>,
    fences: HashMap<u64, u64>,
    main_queue: VecDeque<Submission>,
    transfer_queue: VecDeque<Submission>,
    fail_maps: u32,
    fail_creations: u32,
    fail_presents: u32,
    stats: HeadlessStats,
    draws: Vec<DrawRecord>,
    submissions: Vec<SubmissionRecord>,
    last_presented: Option<Image>,
}

#[derive(Debug, Default)]
struct Bound {
    color: Option<ImageId>,
    depth: Option<ImageId>,
    viewport: Rect,
    scissor: Option<Rect>,
    blend_factor: [f32; 4],
    stencil_ref: u32,
    layout: Option<LayoutId>,
    pipeline: Option<PipelineId>,
    heap: Option<HeapId>,
    constant: Option<(MemoryId, u64)>,
    vertex: Option<(MemoryId, u64, u64)>,
    index: Option<(MemoryId, u64, IndexFormat)>,
    table: Option<(HeapId, u32, u32)>,
}

fn validation(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

fn unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn encode_color(format: TextureFormat, c: [f32; 4]) -> Vec<u8> {
    match format {
        TextureFormat::R8Unorm => vec![unorm(c[0])],
        TextureFormat::Rgba8Unorm => vec![unorm(c[0]), unorm(c[1]), unorm(c[2]), unorm(c[3])],
        TextureFormat::Bgra8Unorm => vec![unorm(c[2]), unorm(c[1]), unorm(c[0]), unorm(c[3])],
        TextureFormat::Depth24Stencil8 => vec![0; 4],
    }
}

fn slice_from(data: &[u8], offset: u64, size: Option<u64>) -> Vec<u8> {
    let start = (offset as usize).min(data.len());
    let end = match size {
        Some(size) => (start + size as usize).min(data.len()),
        None => data.len(),
    };
    data[start..end].to_vec()
}

impl State {
    fn fence(&self, fence: FenceId) -> u64 {
        self.fences.get(&fence.0).copied().unwrap_or(0)
    }

    fn image(&self, image: ImageId) -> Result<&HeadlessImage, Error> {
        self.images
            .get(&image.0)
            .ok_or_else(|| validation(format!("unknown image {}", image.0)))
    }

    fn image_mut(&mut self, image: ImageId) -> Result<&mut HeadlessImage, Error> {
        self.images
            .get_mut(&image.0)
            .ok_or_else(|| validation(format!("unknown image {}", image.0)))
    }

    fn memory(&self, memory: MemoryId) -> Result<&Vec<u8>, Error> {
        self.memories
            .get(&memory.0)
            .ok_or_else(|| validation(format!("unknown memory {}", memory.0)))
    }

    /// Executes the oldest queued submission of `queue`.  `false` if there is none.
    fn run_next(&mut self, queue: QueueKind) -> bool {
        let next = match queue {
            QueueKind::Main => self.main_queue.pop_front(),
            QueueKind::Transfer => self.transfer_queue.pop_front(),
        };
        match next {
            Some(submission) => {
                if let Err(e) = self.execute(submission) {
                    logwise::warn_sync!("Headless submission failed: {e}", e = LogIt(&e));
                }
                true
            }
            None => false,
        }
    }

    fn execute(&mut self, submission: Submission) -> Result<(), Error> {
        let other = match submission.queue {
            QueueKind::Main => QueueKind::Transfer,
            QueueKind::Transfer => QueueKind::Main,
        };
        let mut result = Ok(());
        'waits: for &(fence, value) in &submission.waits {
            while self.fence(fence) < value {
                if !self.run_next(other) {
                    result = Err(validation(format!(
                        "wait for {value} on fence {} can never be satisfied",
                        fence.0
                    )));
                    break 'waits;
                }
            }
        }
        if result.is_ok() {
            let mut bound = Bound::default();
            for command in submission.commands {
                if let Err(e) = self.apply(&mut bound, command) {
                    result = Err(e);
                    break;
                }
            }
        }
        match submission.queue {
            QueueKind::Main => self.stats.main_submissions += 1,
            QueueKind::Transfer => self.stats.transfer_submissions += 1,
        }
        // the queue moves on even if a command was rejected
        if let Some((fence, value)) = submission.signal {
            self.fences.insert(fence.0, value);
        }
        result
    }

    fn apply(&mut self, bound: &mut Bound, command: Command) -> Result<(), Error> {
        match command {
            Command::SetRenderTarget { color, depth } => {
                let target = self.image(color)?;
                bound.viewport = Rect::new(0, 0, target.desc.width, target.desc.height);
                if let Some(depth) = depth {
                    self.image(depth)?;
                }
                bound.color = Some(color);
                bound.depth = depth;
            }
            Command::ClearColor(color) => {
                let target = bound
                    .color
                    .ok_or_else(|| validation("clear without a render target"))?;
                let image = self.image_mut(target)?;
                let pixel = encode_color(image.desc.format, color);
                for chunk in image.levels[0].chunks_exact_mut(pixel.len()) {
                    chunk.copy_from_slice(&pixel);
                }
            }
            Command::ClearDepthStencil { depth, stencil } => {
                let target = bound
                    .depth
                    .ok_or_else(|| validation("depth clear without a depth target"))?;
                let image = self.image_mut(target)?;
                let depth_bits =
                    depth.map(|d| ((d.clamp(0.0, 1.0) * 16_777_215.0) as u32).to_le_bytes());
                for chunk in image.levels[0].chunks_exact_mut(4) {
                    if let Some(bits) = depth_bits {
                        chunk[..3].copy_from_slice(&bits[..3]);
                    }
                    if let Some(s) = stencil {
                        chunk[3] = s;
                    }
                }
            }
            Command::Viewport(rect) => bound.viewport = rect,
            Command::Scissor(rect) => bound.scissor = Some(rect),
            Command::BlendFactor(factor) => bound.blend_factor = factor,
            Command::StencilRef(r) => bound.stencil_ref = r,
            Command::SetLayout(layout) => {
                if !self.layouts.contains_key(&layout.0) {
                    return Err(validation(format!("unknown layout {}", layout.0)));
                }
                self.stats.layout_binds += 1;
                bound.layout = Some(layout);
            }
            Command::SetPipeline(pipeline) => {
                if !self.pipelines.contains_key(&pipeline.0) {
                    return Err(validation(format!("unknown pipeline {}", pipeline.0)));
                }
                self.stats.pipeline_binds += 1;
                bound.pipeline = Some(pipeline);
            }
            Command::SetHeap(heap) => {
                if !self.heaps.contains_key(&heap.0) {
                    return Err(validation(format!("unknown heap {}", heap.0)));
                }
                bound.heap = Some(heap);
            }
            Command::SetConstantBuffer { memory, offset } => {
                self.memory(memory)?;
                bound.constant = Some((memory, offset));
            }
            Command::SetVertexBuffer {
                memory,
                offset,
                size,
                stride: _,
            } => {
                self.memory(memory)?;
                bound.vertex = Some((memory, offset, size));
            }
            Command::SetIndexBuffer {
                memory,
                size: _,
                format,
            } => {
                self.memory(memory)?;
                bound.index = Some((memory, 0, format));
            }
            Command::WriteDescriptors { heap, start, views } => {
                let records = self
                    .heaps
                    .get_mut(&heap.0)
                    .ok_or_else(|| validation(format!("unknown heap {}", heap.0)))?;
                let end = start as usize + views.len();
                if end > records.len() {
                    return Err(validation(format!(
                        "descriptor write {start}..{end} past heap capacity {}",
                        records.len()
                    )));
                }
                for (slot, view) in records[start as usize..end].iter_mut().zip(views) {
                    *slot = Some(view);
                }
            }
            Command::SetDescriptorTable { heap, start, count } => {
                if bound.heap != Some(heap) {
                    return Err(validation("descriptor table outside the bound heap"));
                }
                bound.table = Some((heap, start, count));
            }
            Command::Draw { count, first_index } => self.draw(bound, count, first_index)?,
            Command::Resolve { source, target } => {
                let data = self.image(source)?.levels[0].clone();
                let image = self.image_mut(target)?;
                if image.levels[0].len() != data.len() {
                    return Err(validation("resolve between images of different sizes"));
                }
                image.levels[0] = data;
                self.stats.resolves += 1;
            }
            Command::GenerateMips { image } => {
                let image = self.image_mut(image)?;
                let format = ImageFormat::for_texture(image.desc.format);
                let mut previous = Image::new(
                    image.desc.width,
                    image.desc.height,
                    format,
                    image.levels[0].clone(),
                )
                .map_err(|e| validation(e.to_string()))?;
                for level in 1..image.levels.len() {
                    previous = previous.downsampled();
                    image.levels[level] = previous.data().to_vec();
                }
                self.stats.mip_generations += 1;
            }
            Command::UploadImage {
                image,
                x,
                y,
                width,
                height,
                data,
            } => {
                let target = self.image_mut(image)?;
                let bpp = target.desc.format.bytes_per_pixel();
                let (level_width, level_height) = target.level_size(0);
                if x + width > level_width
                    || y + height > level_height
                    || data.len() != width as usize * height as usize * bpp
                {
                    return Err(validation("upload outside the image"));
                }
                let row = width as usize * bpp;
                for r in 0..height as usize {
                    let dst = ((y as usize + r) * level_width as usize + x as usize) * bpp;
                    target.levels[0][dst..dst + row].copy_from_slice(&data[r * row..(r + 1) * row]);
                }
                self.stats.uploads += 1;
            }
            Command::CopyImage {
                source,
                target,
                width,
                height,
            } => {
                let src = self.image(source)?;
                let bpp = src.desc.format.bytes_per_pixel();
                let src_width = src.desc.width as usize;
                let src_data = src.levels[0].clone();
                let src_height = src.desc.height;
                let dst = self.image_mut(target)?;
                if dst.desc.format.bytes_per_pixel() != bpp {
                    return Err(validation("copy between incompatible formats"));
                }
                let dst_width = dst.desc.width as usize;
                let w = (width as usize).min(src_width).min(dst_width);
                let h = height.min(src_height).min(dst.desc.height) as usize;
                for r in 0..h {
                    let s = r * src_width * bpp;
                    let d = r * dst_width * bpp;
                    dst.levels[0][d..d + w * bpp].copy_from_slice(&src_data[s..s + w * bpp]);
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, bound: &Bound, count: u32, first_index: Option<u32>) -> Result<(), Error> {
        let target = bound
            .color
            .ok_or_else(|| validation("draw without a render target"))?;
        let pipeline_id = bound
            .pipeline
            .ok_or_else(|| validation("draw without a pipeline"))?;
        let layout_id = bound
            .layout
            .ok_or_else(|| validation("draw without a layout"))?;
        let pipeline = self
            .pipelines
            .get(&pipeline_id.0)
            .ok_or_else(|| validation("draw with a destroyed pipeline"))?;
        if pipeline.layout != layout_id {
            return Err(validation("pipeline bound with a different layout"));
        }
        let root_signature = self
            .layouts
            .get(&layout_id.0)
            .ok_or_else(|| validation("draw with a destroyed layout"))?
            .clone();
        let expected = root_signature.texture_count();
        let mut textures = Vec::new();
        if expected > 0 {
            let (heap, start, table_count) = bound
                .table
                .ok_or_else(|| validation("draw samples textures but no table is bound"))?;
            if table_count != expected {
                return Err(validation(format!(
                    "table has {table_count} descriptors, layout wants {expected}"
                )));
            }
            let records = self
                .heaps
                .get(&heap.0)
                .ok_or_else(|| validation("draw with a destroyed heap"))?;
            for i in start..start + table_count {
                let record = records
                    .get(i as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| validation(format!("descriptor {i} was never written")))?;
                let image = self.image(record.image)?;
                textures.push(DrawTexture {
                    image: record.image.0,
                    levels: image.levels.clone(),
                });
            }
        }
        let vertex_data = match bound.vertex {
            Some((memory, offset, size)) => slice_from(self.memory(memory)?, offset, Some(size)),
            None => Vec::new(),
        };
        let index_data = match bound.index {
            Some((memory, offset, _)) => Some(slice_from(self.memory(memory)?, offset, None)),
            None => None,
        };
        let constant_data = match bound.constant {
            Some((memory, offset)) => slice_from(self.memory(memory)?, offset, None),
            None => Vec::new(),
        };
        let record = DrawRecord {
            target: target.0,
            pipeline: pipeline_id.0,
            layout: layout_id.0,
            state: pipeline.state.clone(),
            root_signature,
            samples: pipeline.samples,
            viewport: bound.viewport,
            scissor: bound.scissor,
            blend_factor: bound.blend_factor,
            stencil_ref: bound.stencil_ref,
            count,
            first_index,
            vertex_data,
            index_data,
            constant_data,
            textures,
        };
        self.stats.draws += 1;
        self.draws.push(record);
        Ok(())
    }

    fn drain(&mut self) {
        while self.run_next(QueueKind::Main) || self.run_next(QueueKind::Transfer) {}
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    progress: Condvar,
    lost_callback: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/**
Test-side handle to a headless device.

Clone it freely; all clones (and every backend generation opened from the same
[crate::EntryPoint]) share state.
*/
#[derive(Debug, Clone, Default)]
pub struct HeadlessControl {
    shared: Arc<Shared>,
}

impl HeadlessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// In manual mode submissions wait for [Self::complete_all] or a CPU wait.  Leaving manual
    /// mode completes everything queued.
    pub fn set_manual(&self, manual: bool) {
        let mut state = self.shared.lock();
        state.manual = manual;
        if !manual {
            state.drain();
        }
        self.shared.progress.notify_all();
    }

    pub fn is_manual(&self) -> bool {
        self.shared.lock().manual
    }

    pub fn complete_all(&self) {
        self.shared.lock().drain();
        self.shared.progress.notify_all();
    }

    /// Executes up to `count` main-queue submissions; returns how many ran.
    pub fn complete_main_submissions(&self, count: usize) -> usize {
        let mut state = self.shared.lock();
        let ran = (0..count)
            .take_while(|_| state.run_next(QueueKind::Main))
            .count();
        self.shared.progress.notify_all();
        ran
    }

    pub fn pending_main_submissions(&self) -> usize {
        self.shared.lock().main_queue.len()
    }

    pub fn pending_transfer_submissions(&self) -> usize {
        self.shared.lock().transfer_queue.len()
    }

    /// The next `count` memory writes fail as if mapping failed.
    pub fn fail_next_maps(&self, count: u32) {
        self.shared.lock().fail_maps = count;
    }

    /// The next `count` object creations fail.
    pub fn fail_next_creations(&self, count: u32) {
        self.shared.lock().fail_creations = count;
    }

    /// The next `count` presents fail transiently.
    pub fn fail_next_presents(&self, count: u32) {
        self.shared.lock().fail_presents = count;
    }

    pub fn stats(&self) -> HeadlessStats {
        self.shared.lock().stats.clone()
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.shared.lock().draws.clone()
    }

    /// Every submission made so far, in submission order.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.shared.lock().submissions.clone()
    }

    pub fn take_draws(&self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.shared.lock().draws)
    }

    /// The last image shown by a headless surface.
    pub fn last_presented(&self) -> Option<Image> {
        self.shared.lock().last_presented.clone()
    }

    /// Objects of the current generation that have not been destroyed.
    pub fn live_objects(&self) -> usize {
        let state = self.shared.lock();
        state.memories.len()
            + state.images.len()
            + state.layouts.len()
            + state.pipelines.len()
            + state.heaps.len()
            + state.fences.len()
    }

    pub fn is_lost(&self) -> bool {
        self.shared.lock().lost
    }

    /// Blocks until `count` presents have happened in total.  `false` on timeout.
    pub fn wait_for_presents(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.stats.presents < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .progress
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Starts a new generation.  Objects of earlier generations are forgotten.
    pub(crate) fn open(&self) -> Arc<dyn Backend> {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.lost = false;
        state.memories.clear();
        state.images.clear();
        state.layouts.clear();
        state.pipelines.clear();
        state.heaps.clear();
        state.fences.clear();
        state.main_queue.clear();
        state.transfer_queue.clear();
        logwise::info_sync!(
            "Opened headless device generation {generation}",
            generation = state.generation
        );
        Arc::new(HeadlessBackend {
            shared: self.shared.clone(),
            generation: state.generation,
        })
    }
}

#[derive(Debug)]
pub(crate) struct HeadlessBackend {
    shared: Arc<Shared>,
    generation: u64,
}

impl HeadlessBackend {
    fn live(&self) -> Result<MutexGuard<'_, State>, Error> {
        let state = self.shared.lock();
        if state.lost || state.generation != self.generation {
            Err(Error::DeviceLost)
        } else {
            Ok(state)
        }
    }

    fn create(&self, insert: impl FnOnce(&mut State, u64)) -> Result<u64, Error> {
        let mut state = self.live()?;
        if state.fail_creations > 0 {
            state.fail_creations -= 1;
            return Err(Error::ResourceCreation("injected creation failure".to_owned()));
        }
        state.next_id += 1;
        let id = state.next_id;
        insert(&mut *state, id);
        Ok(id)
    }
}

impl Backend for HeadlessBackend {
    fn create_memory(&self, size: u64, _label: &'static str) -> Result<MemoryId, Error> {
        self.create(|state, id| {
            state.memories.insert(id, vec![0; size as usize]);
            state.stats.memories_created += 1;
        })
        .map(MemoryId)
    }

    fn write_memory(&self, memory: MemoryId, writes: &[(u64, &[u8])]) -> Result<(), Error> {
        let mut state = self.live()?;
        if state.fail_maps > 0 {
            state.fail_maps -= 1;
            return Err(Error::Map("injected map failure".to_owned()));
        }
        let data = state
            .memories
            .get_mut(&memory.0)
            .ok_or_else(|| validation(format!("unknown memory {}", memory.0)))?;
        let mut bytes = 0;
        for &(offset, src) in writes {
            let start = offset as usize;
            let end = start + src.len();
            if end > data.len() {
                return Err(validation("write past the end of a memory object"));
            }
            data[start..end].copy_from_slice(src);
            bytes += src.len() as u64;
        }
        state.stats.memory_writes += 1;
        state.stats.bytes_written += bytes;
        Ok(())
    }

    fn read_memory(&self, memory: MemoryId) -> Result<Vec<u8>, Error> {
        let state = self.live()?;
        state.memory(memory).cloned()
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageId, Error> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::ResourceCreation("zero-sized image".to_owned()));
        }
        let desc = desc.clone();
        self.create(move |state, id| {
            let bpp = desc.format.bytes_per_pixel();
            let levels = (0..desc.mip_levels.max(1))
                .map(|level| {
                    let (w, h) = mip_level_size(desc.width, desc.height, level);
                    vec![0; w as usize * h as usize * bpp]
                })
                .collect();
            state.images.insert(id, HeadlessImage { desc, levels });
            state.stats.images_created += 1;
        })
        .map(ImageId)
    }

    fn read_image(&self, image: ImageId, level: u32) -> Result<Vec<u8>, Error> {
        let state = self.live()?;
        state
            .image(image)?
            .levels
            .get(level as usize)
            .cloned()
            .ok_or_else(|| validation(format!("image has no level {level}")))
    }

    fn create_layout(&self, key: &RootSignatureKey) -> Result<LayoutId, Error> {
        let key = key.clone();
        self.create(move |state, id| {
            state.layouts.insert(id, key);
            state.stats.layouts_created += 1;
        })
        .map(LayoutId)
    }

    fn create_pipeline(
        &self,
        layout: LayoutId,
        state: &PipelineState,
        samples: u32,
    ) -> Result<PipelineId, Error> {
        if !self.live()?.layouts.contains_key(&layout.0) {
            return Err(validation(format!("unknown layout {}", layout.0)));
        }
        let pipeline_state = state.clone();
        self.create(move |state, id| {
            state.pipelines.insert(
                id,
                PipelineRecord {
                    layout,
                    state: pipeline_state,
                    samples,
                },
            );
            state.stats.pipelines_created += 1;
        })
        .map(PipelineId)
    }

    fn create_heap(&self, capacity: u32) -> Result<HeapId, Error> {
        self.create(|state, id| {
            state.heaps.insert(id, vec![None; capacity as usize]);
            state.stats.heaps_created += 1;
        })
        .map(HeapId)
    }

    fn create_fence(&self) -> Result<FenceId, Error> {
        self.create(|state, id| {
            state.fences.insert(id, 0);
        })
        .map(FenceId)
    }

    fn destroy(&self, object: GpuObject) {
        let mut state = self.shared.lock();
        let removed = match object {
            GpuObject::Memory(m) => state.memories.remove(&m.0).is_some(),
            GpuObject::Image(i) => state.images.remove(&i.0).is_some(),
            GpuObject::Layout(l) => state.layouts.remove(&l.0).is_some(),
            GpuObject::Pipeline(p) => state.pipelines.remove(&p.0).is_some(),
            GpuObject::Heap(h) => state.heaps.remove(&h.0).is_some(),
            GpuObject::Fence(f) => state.fences.remove(&f.0).is_some(),
        };
        if removed {
            state.stats.objects_destroyed += 1;
        }
    }

    fn submit(&self, submission: Submission) -> Result<(), Error> {
        let mut state = self.live()?;
        state.submissions.push(SubmissionRecord {
            transfer: submission.queue == QueueKind::Transfer,
            waits: submission.waits.iter().map(|(f, v)| (f.0, *v)).collect(),
            signal: submission.signal.map(|(f, v)| (f.0, v)),
            commands: submission.commands.len(),
        });
        let result = if state.manual {
            match submission.queue {
                QueueKind::Main => state.main_queue.push_back(submission),
                QueueKind::Transfer => state.transfer_queue.push_back(submission),
            }
            Ok(())
        } else {
            state.execute(submission)
        };
        self.shared.progress.notify_all();
        result
    }

    fn completed_value(&self, fence: FenceId) -> u64 {
        self.shared.lock().fence(fence)
    }

    fn wait_fence(&self, fence: FenceId, value: u64) -> Result<(), Error> {
        let mut state = self.live()?;
        while state.fence(fence) < value {
            if !state.run_next(QueueKind::Main) && !state.run_next(QueueKind::Transfer) {
                return Err(validation(format!(
                    "waiting for {value} on fence {} with nothing queued",
                    fence.0
                )));
            }
        }
        self.shared.progress.notify_all();
        Ok(())
    }

    fn create_surface(
        &self,
        _handles: Option<&NativeHandles>,
        config: &SurfaceConfig,
    ) -> Result<Option<Box<dyn SurfaceBackend>>, Error> {
        self.live()?;
        Ok(Some(Box::new(HeadlessSurface {
            shared: self.shared.clone(),
            generation: self.generation,
            width: config.width,
            height: config.height,
        })))
    }

    fn is_lost(&self) -> bool {
        let state = self.shared.lock();
        state.lost || state.generation != self.generation
    }

    fn set_device_lost_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        *self
            .shared
            .lost_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(callback));
    }

    fn simulate_device_loss(&self) {
        {
            let mut state = self.shared.lock();
            if state.generation != self.generation || state.lost {
                return;
            }
            state.lost = true;
            state.main_queue.clear();
            state.transfer_queue.clear();
        }
        self.shared.progress.notify_all();
        let callback = self
            .shared
            .lost_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Presents by snapshotting the back buffer into [HeadlessControl::last_presented].
#[derive(Debug)]
struct HeadlessSurface {
    shared: Arc<Shared>,
    generation: u64,
    width: u32,
    height: u32,
}

impl SurfaceBackend for HeadlessSurface {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn present(&mut self, image: ImageId) -> Result<(), Error> {
        let mut state = self.shared.lock();
        if state.lost || state.generation != self.generation {
            return Err(Error::DeviceLost);
        }
        if state.fail_presents > 0 {
            state.fail_presents -= 1;
            state.stats.failed_presents += 1;
            return Err(Error::Present("injected present failure".to_owned()));
        }
        let source = state.image(image)?;
        if (source.desc.width, source.desc.height) != (self.width, self.height) {
            return Err(Error::Present("back buffer does not match the surface".to_owned()));
        }
        let shown = Image::new(
            self.width,
            self.height,
            ImageFormat::for_texture(source.desc.format),
            source.levels[0].clone(),
        )
        .map_err(|e| validation(e.to_string()))?;
        state.last_presented = Some(shown);
        state.stats.presents += 1;
        drop(state);
        self.shared.progress.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::{ImageUsage, Owned};

    fn backend() -> (HeadlessControl, Arc<dyn Backend>) {
        let control = HeadlessControl::new();
        let backend = control.open();
        (control, backend)
    }

    #[test]
    fn manual_mode_defers_until_waited() {
        let (control, backend) = backend();
        control.set_manual(true);
        let fence = backend.create_fence().unwrap();
        let mut s = Submission::new(QueueKind::Main, Vec::new());
        s.signal = Some((fence, 1));
        backend.submit(s).unwrap();
        assert_eq!(backend.completed_value(fence), 0);
        assert_eq!(control.pending_main_submissions(), 1);
        backend.wait_fence(fence, 1).unwrap();
        assert_eq!(backend.completed_value(fence), 1);
        assert!(backend.wait_fence(fence, 2).is_err());
    }

    #[test]
    fn main_wait_drains_transfer() {
        let (control, backend) = backend();
        control.set_manual(true);
        let upload = backend.create_fence().unwrap();
        let frame = backend.create_fence().unwrap();
        let mut t = Submission::new(QueueKind::Transfer, Vec::new());
        t.signal = Some((upload, 5));
        backend.submit(t).unwrap();
        let mut m = Submission::new(QueueKind::Main, Vec::new());
        m.waits.push((upload, 5));
        m.signal = Some((frame, 1));
        backend.submit(m).unwrap();
        control.complete_main_submissions(1);
        assert_eq!(backend.completed_value(upload), 5);
        assert_eq!(control.pending_transfer_submissions(), 0);
    }

    #[test]
    fn mips_and_loss() {
        let (control, backend) = backend();
        let image = Owned::new(
            &backend,
            backend
                .create_image(&ImageDesc {
                    label: "test",
                    width: 4,
                    height: 2,
                    format: TextureFormat::R8Unorm,
                    mip_levels: 3,
                    samples: 1,
                    usage: ImageUsage::Texture { mipmapped: true },
                })
                .unwrap(),
        );
        let commands = vec![
            Command::UploadImage {
                image: image.id(),
                x: 0,
                y: 0,
                width: 4,
                height: 2,
                data: vec![0, 0, 100, 100, 0, 0, 100, 100],
            },
            Command::GenerateMips { image: image.id() },
        ];
        backend
            .submit(Submission::new(QueueKind::Main, commands))
            .unwrap();
        assert_eq!(backend.read_image(image.id(), 1).unwrap(), vec![0, 100]);
        assert_eq!(backend.read_image(image.id(), 2).unwrap(), vec![50]);

        backend.simulate_device_loss();
        assert!(backend.is_lost());
        assert!(matches!(backend.create_fence(), Err(Error::DeviceLost)));
        drop(image);
        let reopened = control.open();
        assert!(!reopened.is_lost());
        assert!(backend.is_lost());
    }
}
