// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The backend seam.

The engine never talks to a graphics API directly.  It records [Command]s into plain vectors,
hands them over as a [Submission], and refers to native objects only through small opaque
handles.  A backend interprets all of it.

Two backends exist:

* [headless] is a software implementation that is always compiled.  It executes submissions on
  the CPU and is what the test suite drives.
* `wgpu` (feature `backend_wgpu`) talks to a real GPU.
*/

use std::fmt::Debug;
use std::sync::Arc;

use crate::bindings::descriptors::ViewRecord;
use crate::images::pipeline::{PipelineState, RootSignatureKey};
use crate::images::render_pass::{IndexFormat, Rect};
use crate::images::surface::{SurfaceBackend, SurfaceConfig};
use crate::images::view::NativeHandles;
use crate::pixel_formats::TextureFormat;

mod error;
pub(crate) mod headless;
#[cfg(feature = "backend_wgpu")]
pub(crate) mod wgpu;

pub use error::Error;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub(crate) struct $name(pub(crate) u64);

        impl BackendObject for $name {
            fn object(self) -> GpuObject {
                GpuObject::$variant(self)
            }
        }
    };
}

handle!(
    /// A linear, CPU-writable memory object (vertex, index and constant data).
    MemoryId,
    Memory
);
handle!(
    /// A 2D image, possibly mipmapped or multisampled.
    ImageId,
    Image
);
handle!(
    /// A binding signature.
    LayoutId,
    Layout
);
handle!(
    /// A compiled pipeline object.
    PipelineId,
    Pipeline
);
handle!(
    /// A GPU-visible descriptor heap.
    HeapId,
    Heap
);
handle!(
    /// A monotonically increasing counter signaled by a queue.
    FenceId,
    Fence
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GpuObject {
    Memory(MemoryId),
    Image(ImageId),
    Layout(LayoutId),
    Pipeline(PipelineId),
    Heap(HeapId),
    Fence(FenceId),
}

pub(crate) trait BackendObject: Copy + Debug + Send + Sync + 'static {
    fn object(self) -> GpuObject;
}

/**
A native object owned by exactly one engine structure.

Dropping it destroys the object.  Deferred deletion is therefore nothing more than moving the
`Owned` into a frame slot's delete queue, which is cleared once that slot's frame has retired.
*/
pub(crate) struct Owned<T: BackendObject> {
    id: T,
    backend: Arc<dyn Backend>,
}

impl<T: BackendObject> Owned<T> {
    pub(crate) fn new(backend: &Arc<dyn Backend>, id: T) -> Self {
        Owned {
            id,
            backend: backend.clone(),
        }
    }
    pub(crate) fn id(&self) -> T {
        self.id
    }
}

impl<T: BackendObject> Drop for Owned<T> {
    fn drop(&mut self) {
        self.backend.destroy(self.id.object());
    }
}

impl<T: BackendObject> Debug for Owned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Owned").field(&self.id).finish()
    }
}

/// Anything that can sit in a deferred-delete queue.
pub(crate) trait Retirable: Debug + Send {}
impl<T: BackendObject> Retirable for Owned<T> {}
// shared objects (a layout referenced by several pipelines) die with their last reference
impl<T: BackendObject> Retirable for Arc<Owned<T>> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageUsage {
    /// Sampled by shaders.  Mipmapped textures are additionally writable by the mip generator.
    Texture { mipmapped: bool },
    ColorTarget,
    DepthStencil,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ImageDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: ImageUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum QueueKind {
    Main,
    Transfer,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    SetRenderTarget {
        color: ImageId,
        depth: Option<ImageId>,
    },
    ClearColor([f32; 4]),
    ClearDepthStencil {
        depth: Option<f32>,
        stencil: Option<u8>,
    },
    Viewport(Rect),
    Scissor(Rect),
    BlendFactor([f32; 4]),
    StencilRef(u32),
    SetLayout(LayoutId),
    SetPipeline(PipelineId),
    SetHeap(HeapId),
    SetConstantBuffer {
        memory: MemoryId,
        offset: u64,
    },
    SetVertexBuffer {
        memory: MemoryId,
        offset: u64,
        size: u64,
        stride: u32,
    },
    SetIndexBuffer {
        memory: MemoryId,
        size: u64,
        format: IndexFormat,
    },
    /// Copies bookkeeping view records into a GPU-visible heap.
    WriteDescriptors {
        heap: HeapId,
        start: u32,
        views: Vec<ViewRecord>,
    },
    SetDescriptorTable {
        heap: HeapId,
        start: u32,
        count: u32,
    },
    Draw {
        count: u32,
        first_index: Option<u32>,
    },
    Resolve {
        source: ImageId,
        target: ImageId,
    },
    /// Regenerates every level below the base from the base level.
    GenerateMips {
        image: ImageId,
    },
    /// Tightly packed rows in the image's format.
    UploadImage {
        image: ImageId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// Copies the top-left `width` x `height` region of level 0.
    CopyImage {
        source: ImageId,
        target: ImageId,
        width: u32,
        height: u32,
    },
}

#[derive(Debug)]
pub(crate) struct Submission {
    pub queue: QueueKind,
    pub commands: Vec<Command>,
    /// GPU-side waits inserted before the commands execute.
    pub waits: Vec<(FenceId, u64)>,
    pub signal: Option<(FenceId, u64)>,
}

impl Submission {
    pub(crate) fn new(queue: QueueKind, commands: Vec<Command>) -> Self {
        Submission {
            queue,
            commands,
            waits: Vec::new(),
            signal: None,
        }
    }
}

pub(crate) trait Backend: Send + Sync + Debug {
    fn create_memory(&self, size: u64, label: &'static str) -> Result<MemoryId, Error>;
    /// Maps the memory object once, copies every `(offset, bytes)` pair, and unmaps it.
    fn write_memory(&self, memory: MemoryId, writes: &[(u64, &[u8])]) -> Result<(), Error>;
    /// Blocking readback.  Only meaningful once the work writing the object has retired.
    fn read_memory(&self, memory: MemoryId) -> Result<Vec<u8>, Error>;
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageId, Error>;
    /// Blocking readback of one mip level, tightly packed in the image's format.
    fn read_image(&self, image: ImageId, level: u32) -> Result<Vec<u8>, Error>;
    fn create_layout(&self, key: &RootSignatureKey) -> Result<LayoutId, Error>;
    fn create_pipeline(
        &self,
        layout: LayoutId,
        state: &PipelineState,
        samples: u32,
    ) -> Result<PipelineId, Error>;
    fn create_heap(&self, capacity: u32) -> Result<HeapId, Error>;
    fn create_fence(&self) -> Result<FenceId, Error>;
    fn destroy(&self, object: GpuObject);
    fn submit(&self, submission: Submission) -> Result<(), Error>;
    fn completed_value(&self, fence: FenceId) -> u64;
    /// Blocks the calling thread until `fence` reaches `value`.
    fn wait_fence(&self, fence: FenceId, value: u64) -> Result<(), Error>;
    /// `Ok(None)` when this backend has no presentation path for `handles`; the engine then renders
    /// offscreen.
    fn create_surface(
        &self,
        handles: Option<&NativeHandles>,
        config: &SurfaceConfig,
    ) -> Result<Option<Box<dyn SurfaceBackend>>, Error>;
    fn is_lost(&self) -> bool;
    /// `callback` runs (on any thread) when the device is lost.  Replaces any earlier callback.
    fn set_device_lost_callback(&self, callback: Box<dyn Fn() + Send + Sync>);
    /// Marks the device lost and runs the device-lost callback.
    fn simulate_device_loss(&self);
}
