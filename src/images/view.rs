// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
What the engine renders into.

A [View] either wraps a native window (through `raw-window-handle`) or is offscreen.  Offscreen
views still have a full default render target with back buffers; presenting simply rotates them.
*/
use raw_window_handle::{
    HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};

/// Raw handles of a native window.
#[derive(Debug, Clone, Copy)]
pub struct NativeHandles {
    pub(crate) window: RawWindowHandle,
    pub(crate) display: RawDisplayHandle,
}

// The raw handles are plain identifiers.  The caller of View::from_window promises the window
// outlives the attachment and is used from an appropriate thread.
unsafe impl Send for NativeHandles {}
unsafe impl Sync for NativeHandles {}

#[derive(Debug, Clone)]
pub struct View {
    handles: Option<NativeHandles>,
}

impl View {
    /// A view with no window; frames are rendered and "presented" to nowhere.
    pub fn offscreen() -> Self {
        View { handles: None }
    }

    /**
    Creates a view for a native window.

    # Safety
    The window and its display connection must outlive every engine attached to this view.
    */
    pub unsafe fn from_window(
        window: &(impl HasWindowHandle + HasDisplayHandle),
    ) -> Result<Self, HandleError> {
        let handles = NativeHandles {
            window: window.window_handle()?.as_raw(),
            display: window.display_handle()?.as_raw(),
        };
        Ok(View {
            handles: Some(handles),
        })
    }

    pub fn is_offscreen(&self) -> bool {
        self.handles.is_none()
    }

    pub(crate) fn handles(&self) -> Option<&NativeHandles> {
        self.handles.as_ref()
    }
}
