// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Opening a wgpu device.
use std::sync::Arc;

use logwise::privacy::LogIt;
use wgpu::{Limits, Trace};

use super::WgpuBackend;
use crate::imp::{Backend, Error};

#[derive(Debug, Clone, Default)]
pub(crate) struct WgpuEntryPoint {
    adapter_index: Option<usize>,
    debug_layer: bool,
}

impl WgpuEntryPoint {
    pub(crate) fn with_adapter_index(self, index: usize) -> Self {
        WgpuEntryPoint {
            adapter_index: Some(index),
            ..self
        }
    }

    pub(crate) fn with_debug_layer(self, enabled: bool) -> Self {
        WgpuEntryPoint {
            debug_layer: enabled,
            ..self
        }
    }

    /**
    Picks an adapter: the requested index if there is one, else the first hardware adapter, else
    the fallback (software) adapter.
    */
    fn pick_adapter(&self, instance: &wgpu::Instance) -> Result<wgpu::Adapter, Error> {
        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        if let Some(index) = self.adapter_index {
            match adapters.get(index) {
                Some(adapter) => return Ok(adapter.clone()),
                None => {
                    logwise::warn_sync!(
                        "Adapter {index} doesn't exist ({count} found); choosing automatically",
                        index = index,
                        count = adapters.len()
                    );
                }
            }
        }
        if let Some(adapter) = adapters
            .iter()
            .find(|a| a.get_info().device_type != wgpu::DeviceType::Cpu)
        {
            return Ok(adapter.clone());
        }
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: true,
            compatible_surface: None,
        };
        test_executors::sleep_on(instance.request_adapter(&options)).map_err(|e| {
            logwise::error_sync!("No adapter: {e}", e = LogIt(&e));
            Error::NoAdapter
        })
    }

    /// Creates an instance, adapter and device.  Blocks.
    pub(crate) fn open(&self) -> Result<Arc<dyn Backend>, Error> {
        let mut descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        if self.debug_layer {
            descriptor.flags |= wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::DEBUG;
        }
        let instance = wgpu::Instance::new(&descriptor);
        let adapter = self.pick_adapter(&instance)?;
        let info = adapter.get_info();
        logwise::info_sync!(
            "Using adapter {name} ({backend})",
            name = LogIt(&info.name),
            backend = LogIt(&info.backend)
        );
        let descriptor = wgpu::DeviceDescriptor {
            label: Some("frames_in_flight"),
            required_features: Default::default(),
            required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = test_executors::sleep_on(adapter.request_device(&descriptor))?;
        let backend = WgpuBackend::new(instance, adapter, device, queue)?;
        Ok(Arc::new(backend))
    }
}
