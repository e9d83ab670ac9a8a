// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Structural pipeline descriptions.

A [PipelineState] is everything that goes into a compiled pipeline object, and a [RootSignatureKey]
is the binding shape that pipeline expects.  Both are plain values: two descriptions that compare
equal always produce the same GPU object, whether it came out of the cache or was synthesized
again after an eviction.

Every binding signature has one constant buffer slot followed by one texture/sampler pair per
entry in [RootSignatureKey::textures].
*/

use crate::images::render_pass::DrawingMode;
use crate::images::shader::{FragmentShader, VertexShader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
    /// Linear within and between mip levels.
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// A static sampler baked into the binding signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

impl Default for SamplerParams {
    fn default() -> Self {
        SamplerParams {
            filter: Filter::Linear,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RootSignatureKey {
    /// One entry per texture the shaders sample, in binding order.
    pub textures: Vec<SamplerParams>,
}

impl RootSignatureKey {
    pub fn texture_count(&self) -> u32 {
        self.textures.len() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    None,
    /// `src + dst * (1 - src.a)`
    Premultiplied,
    Additive,
    /// `src * blend_factor + dst * (1 - blend_factor)`, see [crate::images::Engine::queue_set_blend_factor].
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        DepthState {
            test: false,
            write: false,
            compare: CompareFunction::Less,
        }
    }
}

/// Applied to both faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub enabled: bool,
    pub compare: CompareFunction,
    pub fail: StencilOperation,
    pub depth_fail: StencilOperation,
    pub pass: StencilOperation,
    pub read_mask: u8,
    pub write_mask: u8,
}

impl Default for StencilState {
    fn default() -> Self {
        StencilState {
            enabled: false,
            compare: CompareFunction::Always,
            fail: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
            read_mask: 0xFF,
            write_mask: 0xFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/**
Everything a compiled pipeline depends on.

Start from [PipelineState::new] and adjust the public fields.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub vertex_shader: VertexShader,
    pub fragment_shader: FragmentShader,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub vertex_stride: u32,
    /// Draws must use exactly this mode.
    pub topology: DrawingMode,
    pub blend: BlendMode,
    pub color_write: bool,
    pub depth: DepthState,
    pub stencil: StencilState,
    pub cull: CullMode,
    pub root_signature: RootSignatureKey,
}

impl PipelineState {
    pub fn new(vertex_shader: VertexShader, fragment_shader: FragmentShader) -> Self {
        PipelineState {
            vertex_shader,
            fragment_shader,
            vertex_attributes: Vec::new(),
            vertex_stride: 0,
            topology: DrawingMode::Triangles,
            blend: BlendMode::Premultiplied,
            color_write: true,
            depth: DepthState::default(),
            stencil: StencilState::default(),
            cull: CullMode::None,
            root_signature: RootSignatureKey::default(),
        }
    }
}
