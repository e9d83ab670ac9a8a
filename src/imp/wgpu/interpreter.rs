// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Translates a submission's [Command]s into one wgpu command buffer.

Commands carry D3D-style incremental state; wgpu wants whole passes.  The recorder keeps the
bound state on the side, opens a render pass lazily at the first draw after a target change, and
ends it before anything that needs the encoder (copies, resolves, mip generation).  Clears are
passes of their own that stay open for the draws following them.
*/
use logwise::privacy::LogIt;

use crate::images::render_pass::{IndexFormat, Rect};
use crate::imp::{Command, Error, HeapId, ImageId, LayoutId, MemoryId, PipelineId};

use super::{Objects, Shared};

fn validation(message: impl Into<String>) -> Error {
    Error::Validation(message.into())
}

#[derive(Debug, Default)]
struct Bound {
    color: Option<ImageId>,
    depth: Option<ImageId>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    blend_factor: [f32; 4],
    stencil_ref: u32,
    layout: Option<LayoutId>,
    pipeline: Option<PipelineId>,
    heap: Option<HeapId>,
    constant: Option<(MemoryId, u64)>,
    vertex: Option<(MemoryId, u64, u64)>,
    index: Option<(MemoryId, u64, IndexFormat)>,
    table: Option<(HeapId, u32, u32)>,
}

struct Recorder<'a> {
    shared: &'a Shared,
    objects: &'a mut Objects,
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
    bound: Bound,
}

pub(super) fn record(
    shared: &Shared,
    objects: &mut Objects,
    label: &'static str,
    commands: Vec<Command>,
) -> Result<wgpu::CommandBuffer, Error> {
    let encoder = shared
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    let mut recorder = Recorder {
        shared,
        objects,
        encoder,
        pass: None,
        bound: Bound {
            blend_factor: [1.0; 4],
            ..Default::default()
        },
    };
    for command in commands {
        recorder.apply(command)?;
    }
    recorder.pass = None;
    Ok(recorder.encoder.finish())
}

fn color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: c[0] as f64,
        g: c[1] as f64,
        b: c[2] as f64,
        a: c[3] as f64,
    }
}

impl Recorder<'_> {
    fn texture(&self, image: ImageId) -> Result<wgpu::Texture, Error> {
        Ok(self.objects.image(image)?.texture.clone())
    }

    fn buffer(&self, memory: MemoryId) -> Result<wgpu::Buffer, Error> {
        Ok(self.objects.memory(memory)?.buffer.clone())
    }

    /// Opens a pass on the bound target.  `None` loads a plane.
    fn begin_pass(
        &mut self,
        clear_color: Option<wgpu::Color>,
        clear_depth: Option<f32>,
        clear_stencil: Option<u32>,
    ) -> Result<(), Error> {
        self.pass = None;
        let target = self
            .bound
            .color
            .ok_or_else(|| validation("render pass without a render target"))?;
        let color_view = self.texture(target)?.create_view(&Default::default());
        let depth_view = match self.bound.depth {
            Some(depth) => Some(self.texture(depth)?.create_view(&Default::default())),
            None => None,
        };
        let depth_stencil_attachment =
            depth_view
                .as_ref()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: clear_stencil.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                });
        let pass = self
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draws"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: clear_color.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.pass = Some(pass);
        Ok(())
    }

    fn apply(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::SetRenderTarget { color, depth } => {
                self.pass = None;
                self.objects.image(color)?;
                if let Some(depth) = depth {
                    self.objects.image(depth)?;
                }
                self.bound.color = Some(color);
                self.bound.depth = depth;
                self.bound.viewport = None;
            }
            Command::ClearColor(c) => self.begin_pass(Some(color(c)), None, None)?,
            Command::ClearDepthStencil { depth, stencil } => {
                if self.bound.depth.is_none() {
                    return Err(validation("depth clear without a depth target"));
                }
                self.begin_pass(None, depth, stencil.map(u32::from))?;
            }
            Command::Viewport(rect) => self.bound.viewport = Some(rect),
            Command::Scissor(rect) => self.bound.scissor = Some(rect),
            Command::BlendFactor(factor) => self.bound.blend_factor = factor,
            Command::StencilRef(r) => self.bound.stencil_ref = r,
            Command::SetLayout(layout) => {
                if !self.objects.layouts.contains_key(&layout.0) {
                    return Err(validation(format!("unknown layout {}", layout.0)));
                }
                self.bound.layout = Some(layout);
            }
            Command::SetPipeline(pipeline) => {
                if !self.objects.pipelines.contains_key(&pipeline.0) {
                    return Err(validation(format!("unknown pipeline {}", pipeline.0)));
                }
                self.bound.pipeline = Some(pipeline);
            }
            Command::SetHeap(heap) => {
                if !self.objects.heaps.contains_key(&heap.0) {
                    return Err(validation(format!("unknown heap {}", heap.0)));
                }
                self.bound.heap = Some(heap);
            }
            Command::SetConstantBuffer { memory, offset } => {
                self.objects.memory(memory)?;
                self.bound.constant = Some((memory, offset));
            }
            Command::SetVertexBuffer {
                memory,
                offset,
                size,
                stride: _,
            } => {
                self.objects.memory(memory)?;
                self.bound.vertex = Some((memory, offset, size));
            }
            Command::SetIndexBuffer {
                memory,
                size,
                format,
            } => {
                self.objects.memory(memory)?;
                self.bound.index = Some((memory, size, format));
            }
            Command::WriteDescriptors { heap, start, views } => {
                let records = self
                    .objects
                    .heaps
                    .get_mut(&heap.0)
                    .ok_or_else(|| validation(format!("unknown heap {}", heap.0)))?;
                let end = start as usize + views.len();
                if end > records.len() {
                    return Err(validation(format!(
                        "descriptor write {start}..{end} past heap capacity {}",
                        records.len()
                    )));
                }
                for (slot, view) in records[start as usize..end].iter_mut().zip(views) {
                    *slot = Some(view);
                }
            }
            Command::SetDescriptorTable { heap, start, count } => {
                if self.bound.heap != Some(heap) {
                    return Err(validation("descriptor table outside the bound heap"));
                }
                self.bound.table = Some((heap, start, count));
            }
            Command::Draw { count, first_index } => self.draw(count, first_index)?,
            Command::Resolve { source, target } => {
                self.pass = None;
                let source = self.texture(source)?.create_view(&Default::default());
                let target = self.texture(target)?.create_view(&Default::default());
                // an empty pass whose only effect is the resolve
                let _pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("resolve"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &source,
                        depth_slice: None,
                        resolve_target: Some(&target),
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            Command::GenerateMips { image } => {
                self.pass = None;
                let texture = self.texture(image)?;
                self.shared
                    .mips
                    .generate(&self.shared.device, &mut self.encoder, &texture)?;
            }
            Command::UploadImage {
                image,
                x,
                y,
                width,
                height,
                data,
            } => {
                self.pass = None;
                self.upload(image, (x, y), (width, height), &data)?;
            }
            Command::CopyImage {
                source,
                target,
                width,
                height,
            } => {
                self.pass = None;
                let source = self.texture(source)?;
                let target = self.texture(target)?;
                let extent = wgpu::Extent3d {
                    width: width.min(source.width()).min(target.width()),
                    height: height.min(source.height()).min(target.height()),
                    depth_or_array_layers: 1,
                };
                if extent.width > 0 && extent.height > 0 {
                    self.encoder.copy_texture_to_texture(
                        source.as_image_copy(),
                        target.as_image_copy(),
                        extent,
                    );
                }
            }
        }
        Ok(())
    }

    fn upload(
        &mut self,
        image: ImageId,
        (x, y): (u32, u32),
        (width, height): (u32, u32),
        data: &[u8],
    ) -> Result<(), Error> {
        use wgpu::util::DeviceExt;
        let texture = self.texture(image)?;
        let bpp = self.objects.image(image)?.desc.format.bytes_per_pixel();
        let row = width as usize * bpp;
        if data.len() != row * height as usize
            || x + width > texture.width()
            || y + height > texture.height()
        {
            return Err(validation("upload outside the image"));
        }
        if row == 0 || height == 0 {
            return Ok(());
        }
        let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);
        let mut padded = vec![0; padded_row * height as usize];
        for (source, target) in data.chunks_exact(row).zip(padded.chunks_exact_mut(padded_row)) {
            target[..row].copy_from_slice(source);
        }
        let staging = self
            .shared
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("upload"),
                contents: &padded,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        self.encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn bind_group(&self, layout: LayoutId) -> Result<Option<wgpu::BindGroup>, Error> {
        let entry = self
            .objects
            .layouts
            .get(&layout.0)
            .ok_or_else(|| validation("draw with a destroyed layout"))?;
        let (constants, offset) = match self.bound.constant {
            Some((memory, offset)) => (self.buffer(memory)?, offset),
            None => (self.shared.empty_constants.clone(), 0),
        };
        let alignment = self.shared.device.limits().min_uniform_buffer_offset_alignment as u64;
        if offset % alignment != 0 || offset >= constants.size() {
            logwise::warn_sync!(
                "Skipping a draw: constant offset {offset} is not a multiple of {alignment} inside the buffer",
                offset = offset,
                alignment = alignment
            );
            return Ok(None);
        }
        let expected = entry.samplers.len() as u32;
        let mut views = Vec::new();
        if expected > 0 {
            let (heap, start, count) = self
                .bound
                .table
                .ok_or_else(|| validation("draw samples textures but no table is bound"))?;
            if count != expected {
                return Err(validation(format!(
                    "table has {count} descriptors, layout wants {expected}"
                )));
            }
            let records = self
                .objects
                .heaps
                .get(&heap.0)
                .ok_or_else(|| validation("draw with a destroyed heap"))?;
            for i in start..start + count {
                let record = records
                    .get(i as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| validation(format!("descriptor {i} was never written")))?;
                views.push(self.texture(record.image)?.create_view(&Default::default()));
            }
        }
        let max_size = self.shared.device.limits().max_uniform_buffer_binding_size as u64;
        let size = (constants.size() - offset).min(max_size);
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &constants,
                offset,
                size: std::num::NonZeroU64::new(size),
            }),
        }];
        for (i, (view, sampler)) in views.iter().zip(&entry.samplers).enumerate() {
            let binding = 1 + 2 * i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: binding + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        Ok(Some(self.shared.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("draw"),
                layout: &entry.bind_group_layout,
                entries: &entries,
            },
        )))
    }

    fn draw(&mut self, count: u32, first_index: Option<u32>) -> Result<(), Error> {
        let target = self
            .bound
            .color
            .ok_or_else(|| validation("draw without a render target"))?;
        let pipeline_id = self
            .bound
            .pipeline
            .ok_or_else(|| validation("draw without a pipeline"))?;
        let layout = self
            .bound
            .layout
            .ok_or_else(|| validation("draw without a layout"))?;
        let pipeline = self
            .objects
            .pipelines
            .get(&pipeline_id.0)
            .ok_or_else(|| validation("draw with a destroyed pipeline"))?;
        if pipeline.layout != layout {
            return Err(validation("pipeline bound with a different layout"));
        }
        let target_texture = self.texture(target)?;
        if pipeline.samples != target_texture.sample_count() {
            return Err(validation("pipeline sample count differs from the target's"));
        }
        let pipeline = pipeline.pipeline.clone();
        let Some(bind_group) = self.bind_group(layout)? else {
            return Ok(());
        };
        let (width, height) = (target_texture.width(), target_texture.height());
        let full = Rect::new(0, 0, width, height);
        let viewport = self.bound.viewport.unwrap_or(full).clamped(width, height);
        let scissor = self.bound.scissor.unwrap_or(full).clamped(width, height);
        if viewport.is_empty() || scissor.is_empty() {
            return Ok(());
        }
        let vertex = match self.bound.vertex {
            Some((memory, offset, size)) if size > 0 => Some((self.buffer(memory)?, offset, size)),
            _ => None,
        };
        let index = match (first_index, self.bound.index) {
            (None, _) => None,
            (Some(_), None) => return Err(validation("indexed draw without an index buffer")),
            (Some(_), Some((_, 0, _))) => return Err(validation("empty index buffer")),
            (Some(first), Some((memory, size, format))) => {
                Some((first, self.buffer(memory)?, size, format))
            }
        };
        if self.pass.is_none() {
            self.begin_pass(None, None, None)?;
        }
        let Some(pass) = self.pass.as_mut() else {
            return Ok(());
        };
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(
            scissor.x as u32,
            scissor.y as u32,
            scissor.width,
            scissor.height,
        );
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_blend_constant(color(self.bound.blend_factor));
        pass.set_stencil_reference(self.bound.stencil_ref);
        if let Some((buffer, offset, size)) = &vertex {
            pass.set_vertex_buffer(0, buffer.slice(*offset..*offset + *size));
        }
        match index {
            Some((first, buffer, size, format)) => {
                let format = match format {
                    IndexFormat::U16 => wgpu::IndexFormat::Uint16,
                    IndexFormat::U32 => wgpu::IndexFormat::Uint32,
                };
                pass.set_index_buffer(buffer.slice(0..size), format);
                pass.draw_indexed(first..first + count, 0, 0..1);
            }
            None => pass.draw(0..count, 0..1),
        }
        logwise::trace_sync!(
            "draw {count} into image {target}",
            count = count,
            target = LogIt(&target)
        );
        Ok(())
    }
}
