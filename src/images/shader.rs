// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shader programs.
//!
//! Shader contents are opaque to the engine.  Two shaders are the same shader when their code is
//! byte-identical, which is what pipeline caching keys on.
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentShader {
    // may need additional type design for future backends
    pub(crate) wgsl_code: Arc<str>,
}
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexShader {
    // may need additional type design for future backends
    pub(crate) wgsl_code: Arc<str>,
}

impl FragmentShader {
    /// The module must export an `fs_main` entry point.
    pub fn new(wgsl_code: impl Into<Arc<str>>) -> Self {
        Self {
            wgsl_code: wgsl_code.into(),
        }
    }
}

impl VertexShader {
    /// The module must export a `vs_main` entry point.
    pub fn new(wgsl_code: impl Into<Arc<str>>) -> Self {
        Self {
            wgsl_code: wgsl_code.into(),
        }
    }
}
