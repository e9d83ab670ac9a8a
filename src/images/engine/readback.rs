// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Synchronous readback.  Everything here waits for the GPU and is meant for tests, screenshots and
debugging, not for the steady state.
*/
use logwise::privacy::LogIt;

use super::Engine;
use crate::imp::ImageId;
use crate::pixel_formats::{Image, ImageFormat};

impl Engine {
    /**
    Reads back render target `id`, or with `id == 0` the back buffer the next [Self::present]
    would show.

    Runs a whole frame of its own (resolving multisampled content) and waits for it, so it must be
    called between frames.  Returns an empty image when there is nothing to read.  The result is
    RGBA8 premultiplied, top row first.
    */
    pub fn execute_and_wait_readback_render_target(&mut self, id: u32) -> Image {
        let empty = Image::filled(0, 0, ImageFormat::Rgba8Premultiplied, [0; 4]);
        if self.frame.in_frame {
            logwise::warn_sync!("Readback inside a frame");
            return empty;
        }
        if id != 0 && self.render_targets.get(id).is_none() {
            logwise::warn_sync!("Readback of unknown render target {id}", id = id);
            return empty;
        }
        let frame_index = self.frame.index;
        self.begin_frame();
        if !self.frame.in_frame {
            return empty;
        }
        let source = self.readback_source(id);
        self.end_frame();
        let Some((image, (width, height))) = source else {
            logwise::warn_sync!("Render target {id} has nothing to read back", id = id);
            return empty;
        };
        self.wait_gpu();
        if !self.poll_device() {
            return empty;
        }
        let Some(gpu) = &self.gpu else {
            return empty;
        };
        let data = match gpu.backend.read_image(image, 0) {
            Ok(data) => data,
            Err(e) => {
                super::report(&self.device, gpu.generation, "readback", &e);
                return empty;
            }
        };
        let image = match Image::new(width, height, ImageFormat::Rgba8Premultiplied, data) {
            Ok(image) => image,
            Err(e) => {
                logwise::warn_sync!("Readback: {e}", e = LogIt(&e));
                return empty;
            }
        };
        if self.config.dump_readbacks {
            dump(&image, frame_index, id);
        }
        image
    }

    /// The single-sample image holding `id`'s content, queuing the resolve it needs.
    fn readback_source(&mut self, id: u32) -> Option<(ImageId, (u32, u32))> {
        let present_index = self.present_index;
        let gpu = self.gpu.as_mut()?;
        if id == 0 {
            // end_frame resolves the default target
            let target = &gpu.default_target;
            return Some((
                target.back_buffer(present_index)?,
                (target.width, target.height),
            ));
        }
        let entry = self.render_targets.get(id)?;
        let image = entry.sampled_image()?;
        gpu.recording.commands.extend(entry.resolve_command());
        Some((image, entry.size()?))
    }

    /**
    The content of buffer `id`'s backing object for frame slot `slot`, as the GPU sees it.

    Waits for the GPU first.  `None` when the slot has never drawn with the buffer.
    */
    pub fn inspect_buffer_slot(&mut self, id: u32, slot: usize) -> Option<Vec<u8>> {
        if !self.poll_device() {
            return None;
        }
        self.wait_gpu();
        let gpu = self.gpu.as_ref()?;
        let buffer = self.buffers.get(id)?;
        let memory = buffer.backing(slot)?;
        match gpu.backend.read_memory(memory) {
            Ok(mut data) => {
                data.truncate(buffer.len() as usize);
                Some(data)
            }
            Err(e) => {
                super::report(&self.device, gpu.generation, "buffer inspection", &e);
                None
            }
        }
    }
}

/// Writes `image` to `readback_<frame>_<id>.png` in the working directory.
fn dump(image: &Image, frame: u64, id: u32) {
    let path = format!("readback_{frame}_{id}.png");
    let result = image
        .to_png()
        .map_err(|e| e.to_string())
        .and_then(|png| std::fs::write(&path, png).map_err(|e| e.to_string()));
    match result {
        Ok(()) => {
            logwise::info_sync!("Wrote {path}", path = LogIt(&path));
        }
        Err(e) => {
            logwise::warn_sync!(
                "Can't write {path}: {e}",
                path = LogIt(&path),
                e = LogIt(&e)
            );
        }
    }
}
