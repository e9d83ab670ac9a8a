// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Running an engine on its own thread.

The producer (typically the thread that builds the scene) and the render thread meet once per
frame, in [RenderThread::sync].  While the producer's closure runs, the producer is blocked and the
render thread holds the engine; afterwards the render thread records and submits the frame with
the render closure while the producer goes on to build the next one.

```
use frames_in_flight::{Device, Engine, EngineConfig, EntryPoint};
use frames_in_flight::images::threaded::RenderThread;
use frames_in_flight::images::view::View;

let device = Device::new(EntryPoint::headless()).unwrap();
let mut engine = Engine::new(device, EngineConfig::default());
engine.attach(View::offscreen(), (16, 16), 1.0, 1, false).unwrap();
let thread = RenderThread::spawn(engine, |engine| {
    engine.begin_frame();
    engine.queue_clear_render_target([0.0, 0.0, 0.0, 1.0]);
    engine.end_frame();
    engine.present();
})
.unwrap();
let frame = thread.sync(|engine| engine.frame_index());
assert_eq!(frame, Some(0));
let engine = thread.stop().unwrap();
assert_eq!(engine.frame_index(), 1);
```
*/
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::images::engine::Engine;

type Job = Box<dyn FnOnce(&mut Engine) + Send>;

#[derive(Default)]
struct SyncState {
    job: Option<Job>,
    /// Jobs handed over so far.
    requested: u64,
    /// Jobs the render thread has finished.
    completed: u64,
    stop: bool,
    /// The render thread has exited (possibly by panicking).
    exited: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SyncState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared").finish_non_exhaustive()
    }
}

/// Marks the render thread exited however it leaves, so the producer never waits forever.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.lock().exited = true;
        self.0.changed.notify_all();
    }
}

/**
An [Engine] owned by a dedicated render thread.

Dropping the handle stops the thread and drops the engine with it.
*/
#[derive(Debug)]
pub struct RenderThread {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Engine>>,
}

impl RenderThread {
    /**
    Moves `engine` to a new thread named `frames_in_flight render`.

    The thread sleeps until the first [Self::sync]; after each sync point it calls `render` once.
    */
    pub fn spawn<R>(engine: Engine, render: R) -> Result<Self, std::io::Error>
    where
        R: FnMut(&mut Engine) + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("frames_in_flight render".to_string())
            .spawn(move || render_loop(engine, render, thread_shared))?;
        logwise::info_sync!("Render thread started");
        Ok(RenderThread {
            shared,
            thread: Some(thread),
        })
    }

    /**
    The per-frame sync point.

    Blocks until the render thread has run `f` on the engine, and returns its result.  The
    render thread then renders a frame while the caller continues.  `None` if the render thread
    is gone.
    */
    pub fn sync<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        let result = Arc::new(Mutex::new(None));
        let slot = result.clone();
        let job: Job = Box::new(move |engine| {
            let value = f(engine);
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        });

        let mut state = self.shared.lock();
        // the previous frame's job has to be picked up first
        while state.job.is_some() && !state.exited {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.exited || state.stop {
            return None;
        }
        state.job = Some(job);
        state.requested += 1;
        let ticket = state.requested;
        self.shared.changed.notify_all();
        let interval = logwise::perfwarn_begin!("RenderThread::sync");
        while state.completed < ticket && !state.exited {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(interval);
        drop(state);
        result.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Stops the render thread after its current frame and returns the engine.  `None` if the
    /// render thread panicked.
    pub fn stop(mut self) -> Option<Engine> {
        self.join()
    }

    fn join(&mut self) -> Option<Engine> {
        let thread = self.thread.take()?;
        self.shared.lock().stop = true;
        self.shared.changed.notify_all();
        match thread.join() {
            Ok(engine) => {
                logwise::info_sync!("Render thread stopped");
                Some(engine)
            }
            Err(_) => {
                logwise::error_sync!("Render thread panicked");
                None
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.join();
    }
}

fn render_loop<R>(mut engine: Engine, mut render: R, shared: Arc<Shared>) -> Engine
where
    R: FnMut(&mut Engine),
{
    let _exit = ExitGuard(shared.clone());
    loop {
        let job = {
            let mut state = shared.lock();
            while state.job.is_none() && !state.stop {
                state = shared
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match state.job.take() {
                Some(job) => job,
                None => break,
            }
        };
        job(&mut engine);
        shared.lock().completed += 1;
        shared.changed.notify_all();
        render(&mut engine);
    }
    engine
}
