// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Platform-independent entrypoint implementation
//!
//! An [EntryPoint] knows how to open a graphics device.  [crate::Device] keeps it so that a lost
//! device can be opened again.
use std::fmt::Formatter;
use std::sync::Arc;

use crate::imp;
use crate::imp::headless::HeadlessControl;

#[derive(Debug, Clone)]
enum Kind {
    Headless(HeadlessControl),
    #[cfg(feature = "backend_wgpu")]
    Wgpu(imp::wgpu::WgpuEntryPoint),
}

#[derive(Debug, Clone)]
pub struct EntryPoint(Kind);

/// platform-independent error type
#[derive(Debug)]
pub struct EntryPointError(imp::Error);
impl std::fmt::Display for EntryPointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
impl std::error::Error for EntryPointError {}

impl EntryPoint {
    /// The software backend, with a fresh control handle.
    pub fn headless() -> Self {
        Self::headless_with(HeadlessControl::new())
    }

    /// The software backend, driven through `control`.
    pub fn headless_with(control: HeadlessControl) -> Self {
        EntryPoint(Kind::Headless(control))
    }

    /// A real GPU through wgpu.
    #[cfg(feature = "backend_wgpu")]
    pub fn wgpu() -> Self {
        EntryPoint(Kind::Wgpu(imp::wgpu::WgpuEntryPoint::default()))
    }

    /// Prefers the adapter at `index` in enumeration order.  Ignored by the headless backend.
    pub fn with_adapter_index(self, index: usize) -> Self {
        match self.0 {
            #[cfg(feature = "backend_wgpu")]
            Kind::Wgpu(w) => EntryPoint(Kind::Wgpu(w.with_adapter_index(index))),
            other => {
                let _ = index;
                EntryPoint(other)
            }
        }
    }

    /// Enables backend validation.  Ignored by the headless backend.
    pub fn with_debug_layer(self, enabled: bool) -> Self {
        match self.0 {
            #[cfg(feature = "backend_wgpu")]
            Kind::Wgpu(w) => EntryPoint(Kind::Wgpu(w.with_debug_layer(enabled))),
            other => {
                let _ = enabled;
                EntryPoint(other)
            }
        }
    }

    /**
    Picks a backend from the environment.

    * `FIF_BACKEND`: `headless` or `wgpu` (the default when compiled in).
    * `FIF_ADAPTER_INDEX`: preferred adapter.
    * `FIF_DEBUG_LAYER`: any value enables backend validation.
    */
    pub fn from_env() -> Result<Self, EntryPointError> {
        let backend = std::env::var("FIF_BACKEND").ok();
        let mut entry_point = match backend.as_deref() {
            Some("headless") => Self::headless(),
            #[cfg(feature = "backend_wgpu")]
            Some("wgpu") | None => Self::wgpu(),
            #[cfg(not(feature = "backend_wgpu"))]
            None => Self::headless(),
            Some(other) => {
                return Err(EntryPointError(imp::Error::Validation(format!(
                    "unknown FIF_BACKEND {other}"
                ))));
            }
        };
        if let Ok(index) = std::env::var("FIF_ADAPTER_INDEX") {
            match index.trim().parse() {
                Ok(index) => entry_point = entry_point.with_adapter_index(index),
                Err(_) => {
                    logwise::warn_sync!(
                        "Ignoring unparsable FIF_ADAPTER_INDEX={index}",
                        index = logwise::privacy::LogIt(&index)
                    );
                }
            }
        }
        if std::env::var_os("FIF_DEBUG_LAYER").is_some() {
            entry_point = entry_point.with_debug_layer(true);
        }
        Ok(entry_point)
    }

    /// The headless control handle, if this is the software backend.
    pub fn headless_control(&self) -> Option<&HeadlessControl> {
        match &self.0 {
            Kind::Headless(control) => Some(control),
            #[cfg(feature = "backend_wgpu")]
            Kind::Wgpu(_) => None,
        }
    }

    /// Opens a new device.  Blocks.
    pub(crate) fn open(&self) -> Result<Arc<dyn imp::Backend>, EntryPointError> {
        match &self.0 {
            Kind::Headless(control) => Ok(control.open()),
            #[cfg(feature = "backend_wgpu")]
            Kind::Wgpu(w) => w.open().map_err(EntryPointError),
        }
    }
}
