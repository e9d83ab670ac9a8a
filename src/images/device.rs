// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The shared graphics device.

One [Device] is created per process and shared (via `Arc`) by every attached
[Engine](crate::images::Engine).  It owns the backend and drives the device-loss state machine:

```text
Active --(device removed)--> Lost --(next access)--> Reinitializing --> Active
```

Each successful (re)open starts a new *generation*.  A loss report carries the generation it was
observed on, so a stale report cannot take down a freshly reopened device.
*/
use std::fmt::Formatter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::entry_point::{EntryPoint, EntryPointError};
use crate::imp::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Active,
    Lost,
    Reinitializing,
}

/// Notified (on any thread) when the device is lost.
pub trait DeviceLossObserver: Send + Sync {
    fn device_lost(&self);
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CreateError {
    #[error("Can't open device {0}")]
    EntryPoint(#[from] EntryPointError),
}

struct DeviceState {
    backend: Arc<dyn Backend>,
    generation: u64,
    status: DeviceStatus,
}

pub struct Device {
    entry_point: EntryPoint,
    state: Mutex<DeviceState>,
    observers: Mutex<Vec<Weak<dyn DeviceLossObserver>>>,
    weak_self: Weak<Device>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Device")
            .field("entry_point", &self.entry_point)
            .field("generation", &state.generation)
            .field("status", &state.status)
            .finish()
    }
}

fn install_loss_callback(device: &Weak<Device>, backend: &Arc<dyn Backend>, generation: u64) {
    let device = device.clone();
    backend.set_device_lost_callback(Box::new(move || {
        if let Some(device) = device.upgrade() {
            device.device_loss_detected(generation);
        }
    }));
}

impl Device {
    /// Opens a device.  Blocks while the backend initializes.
    pub fn new(entry_point: EntryPoint) -> Result<Arc<Device>, CreateError> {
        let backend = entry_point.open()?;
        let device = Arc::new_cyclic(|weak_self| {
            install_loss_callback(weak_self, &backend, 1);
            Device {
                entry_point,
                state: Mutex::new(DeviceState {
                    backend,
                    generation: 1,
                    status: DeviceStatus::Active,
                }),
                observers: Mutex::new(Vec::new()),
                weak_self: weak_self.clone(),
            }
        });
        logwise::info_sync!("Device opened");
        Ok(device)
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> DeviceStatus {
        self.lock().status
    }

    /// Increments every time the device is reopened after a loss.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry_point
    }

    /// Observers are held weakly; dropped observers are pruned.
    pub fn register_loss_observer(&self, observer: Weak<dyn DeviceLossObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Makes the backend behave as if the GPU was removed.
    pub fn simulate_device_loss(&self) {
        let backend = self.lock().backend.clone();
        logwise::warn_sync!("Simulating device loss");
        backend.simulate_device_loss();
    }

    /// Reports a loss observed on `generation`.  Reports for older generations are ignored.
    pub(crate) fn device_loss_detected(&self, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation != generation || state.status != DeviceStatus::Active {
                return;
            }
            state.status = DeviceStatus::Lost;
        }
        logwise::error_sync!(
            "Device lost (generation {generation})",
            generation = generation
        );
        let observers: Vec<Arc<dyn DeviceLossObserver>> = {
            let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
            observers.retain(|o| o.strong_count() > 0);
            observers.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            observer.device_lost();
        }
    }

    /**
    A usable backend, reopening the device first if it was lost.

    Engines call this on their next access after a loss; the first one to get here does the
    reopen, the rest pick up the new generation.
    */
    pub(crate) fn active_backend(&self) -> Result<(Arc<dyn Backend>, u64), CreateError> {
        let mut state = self.lock();
        if state.status == DeviceStatus::Active {
            return Ok((state.backend.clone(), state.generation));
        }
        state.status = DeviceStatus::Reinitializing;
        logwise::info_sync!("Reinitializing device");
        match self.entry_point.open() {
            Ok(backend) => {
                state.generation += 1;
                install_loss_callback(&self.weak_self, &backend, state.generation);
                state.backend = backend;
                state.status = DeviceStatus::Active;
                logwise::info_sync!(
                    "Device reinitialized (generation {generation})",
                    generation = state.generation
                );
                Ok((state.backend.clone(), state.generation))
            }
            Err(e) => {
                state.status = DeviceStatus::Lost;
                Err(e.into())
            }
        }
    }
}
