// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend error taxonomy.
//!
//! Every native failure is converted into one of these kinds before it reaches the engine.
//! The engine in turn never lets them cross its public surface; see [crate::images::Engine].

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("The graphics device was removed or reset")]
    DeviceLost,
    #[error("Can't create resource: {0}")]
    ResourceCreation(String),
    #[error("Can't map memory: {0}")]
    Map(String),
    #[error("Present failed: {0}")]
    Present(String),
    #[error("Invalid use of the backend: {0}")]
    Validation(String),
    #[error("No suitable adapter")]
    NoAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error("Can't create surface {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[cfg(feature = "backend_wgpu")]
    #[error("Can't create device {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

impl Error {
    /// Whether this error means the device is gone and recovery must start.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Error::DeviceLost)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn classifies_device_loss() {
        assert!(Error::DeviceLost.is_device_lost());
        assert!(!Error::Present("occluded".to_string()).is_device_lost());
        assert!(!Error::Map("busy".to_string()).is_device_lost());
    }
}
