// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! frames_in_flight is the GPU command and resource engine underneath a retained-mode 2D scene graph.

The scene graph above it decides *what* to draw.  This crate decides *when* the GPU may touch
anything: it owns the device, the swap chain, per-frame command lists and the pools of buffers,
textures, render targets and pipeline objects, and sequences CPU recording against asynchronous GPU
execution.

# Frames in flight

The engine keeps `F` frame slots (2 by default, see [EngineConfig]).  Frame `k` records into slot
`k % F`, so up to `F` frames can be executing on the GPU while the CPU records the next one.  The
only steady-state CPU wait is at [Engine::begin_frame], when the slot about to be reused still
has a frame in flight.

That has consequences for every resource:

| Resource      | CPU side                  | GPU side                         | Lifetime                              |
|---------------|---------------------------|----------------------------------|---------------------------------------|
| Buffer        | one authoritative copy    | one object per slot              | dirty ranges are carried between slots |
| Texture       | a shadow of the last upload | one image                     | uploads run on a transfer queue        |
| Render target | clear color and size      | color, depth, optional resolve   | resolved before sampling or readback   |
| Pipeline      | its [images::pipeline::PipelineState] | an LRU-cached object  | evictions wait for the frame to retire |

Nothing is destroyed while a frame that could reference it is in flight.  Released objects are
queued on a frame slot and destroyed when that slot is reused, and their IDs are reused only then.

# Failures

Operations do not return backend errors.  A failed creation leaves the resource unusable and logs
a warning; a failed buffer map keeps the data pending for the next use; a failed present drops the
frame.  Device loss is the exception that is *handled*: every device object is released, logical
state (IDs, sizes, buffer contents, texture shadows) is kept, and the next frame rebuilds
everything.  See [images::Device].

# Backends

Commands are recorded backend-neutrally and handed to one of two backends:

* a software *headless* backend, always compiled, which really executes clears, uploads, resolves
  and mip generation and records every draw.  It is what the tests drive, through
  [HeadlessControl].
* [wgpu](https://wgpu.rs), behind the default `backend_wgpu` feature.

```
use frames_in_flight::{Device, Engine, EngineConfig, EntryPoint};
use frames_in_flight::images::view::View;

let device = Device::new(EntryPoint::headless()).unwrap();
let mut engine = Engine::new(device, EngineConfig::default());
engine.attach(View::offscreen(), (64, 64), 1.0, 1, false).unwrap();

let buffer = engine.gen_buffer();
engine.reset_buffer(buffer, &[0; 64]);

engine.begin_frame();
engine.queue_clear_render_target([1.0, 0.0, 0.0, 1.0]);
engine.write_buffer(buffer, 0, &[1, 2, 3, 4]);
engine.end_frame();

let pixels = engine.execute_and_wait_readback_render_target(0);
assert_eq!(pixels.pixel(0, 0), Some(&[255, 0, 0, 255][..]));
engine.present();
```
*/

logwise::declare_logging_domain!();

pub mod bindings;
mod bittricks;
pub mod config;
mod entry_point;
pub mod images;
mod imp;
mod multibuffer;
pub mod pixel_formats;
mod ring_buffer;

pub use bittricks::{mip_map_adjusted_source_size, mip_map_levels};
pub use config::EngineConfig;
pub use entry_point::{EntryPoint, EntryPointError};
pub use images::{AttachError, CreateError, Device, DeviceStatus, Engine, FrameStats};
pub use imp::headless::{
    DrawRecord, DrawTexture, HeadlessControl, HeadlessStats, SubmissionRecord,
};
