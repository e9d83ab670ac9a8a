// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Binding signatures and pipelines.
//!
//! A signature becomes one bind group layout: the constant buffer at binding 0, then texture `i`
//! at `1 + 2i` and its sampler at `2 + 2i`.  Static samplers are created with the layout.
use crate::images::pipeline::{
    AddressMode, BlendMode, CompareFunction, CullMode, Filter, PipelineState, RootSignatureKey,
    SamplerParams, StencilOperation, VertexFormat,
};
use crate::images::render_pass::DrawingMode;
use crate::imp::LayoutId;
use crate::pixel_formats::TextureFormat;

use super::texture_format;

/// Every target the engine renders into has this color format.
pub(super) const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
/// And this depth format.
pub(super) const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24Stencil8;

#[derive(Debug)]
pub(super) struct LayoutEntry {
    pub(super) bind_group_layout: wgpu::BindGroupLayout,
    pub(super) pipeline_layout: wgpu::PipelineLayout,
    pub(super) samplers: Vec<wgpu::Sampler>,
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn sampler(device: &wgpu::Device, params: &SamplerParams) -> wgpu::Sampler {
    let (filter, mipmap_filter) = match params.filter {
        Filter::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
        Filter::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
        Filter::LinearMipmapLinear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("static sampler"),
        address_mode_u: address_mode(params.address_u),
        address_mode_v: address_mode(params.address_v),
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        ..Default::default()
    })
}

impl LayoutEntry {
    pub(super) fn new(device: &wgpu::Device, key: &RootSignatureKey) -> Self {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for (i, params) in key.textures.iter().enumerate() {
            let binding = 1 + 2 * i as u32;
            let filterable = params.filter != Filter::Nearest;
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding + 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
                count: None,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("root signature"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("root signature"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        LayoutEntry {
            bind_group_layout,
            pipeline_layout,
            samplers: key.textures.iter().map(|p| sampler(device, p)).collect(),
        }
    }
}

#[derive(Debug)]
pub(super) struct PipelineEntry {
    pub(super) pipeline: wgpu::RenderPipeline,
    pub(super) layout: LayoutId,
    pub(super) samples: u32,
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32 => wgpu::VertexFormat::Float32,
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Unorm8x4 => wgpu::VertexFormat::Unorm8x4,
    }
}

fn topology(mode: DrawingMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawingMode::Points => wgpu::PrimitiveTopology::PointList,
        DrawingMode::Lines => wgpu::PrimitiveTopology::LineList,
        DrawingMode::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        DrawingMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
        DrawingMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

fn compare(function: CompareFunction) -> wgpu::CompareFunction {
    match function {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOperation) -> wgpu::StencilOperation {
    match op {
        StencilOperation::Keep => wgpu::StencilOperation::Keep,
        StencilOperation::Zero => wgpu::StencilOperation::Zero,
        StencilOperation::Replace => wgpu::StencilOperation::Replace,
        StencilOperation::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOperation::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOperation::Invert => wgpu::StencilOperation::Invert,
    }
}

fn blend(mode: BlendMode) -> Option<wgpu::BlendState> {
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    match mode {
        BlendMode::None => None,
        BlendMode::Premultiplied => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::Additive => {
            let add = component(wgpu::BlendFactor::One, wgpu::BlendFactor::One);
            Some(wgpu::BlendState {
                color: add,
                alpha: add,
            })
        }
        BlendMode::Constant => {
            let constant = component(
                wgpu::BlendFactor::Constant,
                wgpu::BlendFactor::OneMinusConstant,
            );
            Some(wgpu::BlendState {
                color: constant,
                alpha: constant,
            })
        }
    }
}

fn depth_stencil(state: &PipelineState) -> wgpu::DepthStencilState {
    let stencil = if state.stencil.enabled {
        let face = wgpu::StencilFaceState {
            compare: compare(state.stencil.compare),
            fail_op: stencil_operation(state.stencil.fail),
            depth_fail_op: stencil_operation(state.stencil.depth_fail),
            pass_op: stencil_operation(state.stencil.pass),
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask: state.stencil.read_mask as u32,
            write_mask: state.stencil.write_mask as u32,
        }
    } else {
        wgpu::StencilState::default()
    };
    let depth_compare = if state.depth.test {
        compare(state.depth.compare)
    } else {
        wgpu::CompareFunction::Always
    };
    wgpu::DepthStencilState {
        format: texture_format(DEPTH_FORMAT),
        depth_write_enabled: state.depth.test && state.depth.write,
        depth_compare,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}

impl PipelineEntry {
    pub(super) fn new(
        device: &wgpu::Device,
        pipeline_layout: &wgpu::PipelineLayout,
        layout: LayoutId,
        state: &PipelineState,
        samples: u32,
    ) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vertex shader"),
            source: wgpu::ShaderSource::Wgsl(state.vertex_shader.wgsl_code.as_ref().into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fragment shader"),
            source: wgpu::ShaderSource::Wgsl(state.fragment_shader.wgsl_code.as_ref().into()),
        });
        let attributes: Vec<wgpu::VertexAttribute> = state
            .vertex_attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: vertex_format(a.format),
                offset: a.offset as u64,
                shader_location: a.location,
            })
            .collect();
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: state.vertex_stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let buffers: &[wgpu::VertexBufferLayout] = if attributes.is_empty() {
            &[]
        } else {
            &buffers
        };
        let cull_mode = match state.cull {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        };
        let write_mask = if state.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("pipeline"),
            layout: Some(pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: topology(state.topology),
                cull_mode,
                ..Default::default()
            },
            depth_stencil: Some(depth_stencil(state)),
            multisample: wgpu::MultisampleState {
                count: samples,
                ..Default::default()
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format(COLOR_FORMAT),
                    blend: blend(state.blend),
                    write_mask,
                })],
            }),
            multiview: None,
            cache: None,
        });
        PipelineEntry {
            pipeline,
            layout,
            samples,
        }
    }
}
