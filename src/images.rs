// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The rendering component of frames_in_flight */

pub use device::{CreateError, Device, DeviceLossObserver, DeviceStatus};
pub use engine::{AttachError, Engine, FrameStats, GpuError};

pub mod device;
pub(crate) mod engine;
pub mod pipeline;
pub(crate) mod pipeline_cache;
pub mod render_pass;
pub mod shader;
pub(crate) mod surface;
pub mod threaded;
pub mod view;
