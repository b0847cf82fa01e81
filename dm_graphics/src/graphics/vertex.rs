/// Vertex stream declarations
///
/// A `VertexDeclaration` is the resolved layout of one vertex buffer
/// binding: stream offsets, the stride and a hash that identifies the
/// layout inside pipeline cache keys.

use crate::utils::{hash_name, HashState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
}

impl VertexType {
    /// Size of one component in bytes
    pub fn size(self) -> u32 {
        match self {
            VertexType::Byte | VertexType::UnsignedByte => 1,
            VertexType::Short | VertexType::UnsignedShort => 2,
            VertexType::Int | VertexType::UnsignedInt | VertexType::Float => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepFunction {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexStream {
    pub name: String,
    pub name_hash: u64,
    /// Component count (1..=4)
    pub size: u32,
    pub ty: VertexType,
    pub normalize: bool,
    /// Byte offset inside one vertex
    pub offset: u32,
}

/// Builder for vertex declarations
#[derive(Debug, Clone, Default)]
pub struct VertexStreamDeclaration {
    streams: Vec<VertexStream>,
    step_function: VertexStepFunction,
}

impl VertexStreamDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stream(mut self, name: &str, size: u32, ty: VertexType, normalize: bool) -> Self {
        self.streams.push(VertexStream {
            name: name.to_string(),
            name_hash: hash_name(name),
            size,
            ty,
            normalize,
            offset: 0,
        });
        self
    }

    pub fn step_function(mut self, step_function: VertexStepFunction) -> Self {
        self.step_function = step_function;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexDeclaration {
    pub streams: Vec<VertexStream>,
    pub stride: u32,
    pub step_function: VertexStepFunction,
    /// Identity of this layout inside pipeline keys
    pub pipeline_hash: u64,
}

impl VertexDeclaration {
    /// Pack the streams tightly in declaration order
    pub fn new(declaration: &VertexStreamDeclaration) -> Self {
        let mut streams = declaration.streams.clone();
        let mut offset = 0;
        for stream in streams.iter_mut() {
            stream.offset = offset;
            offset += stream.size * stream.ty.size();
        }
        Self::build(streams, offset, declaration.step_function)
    }

    /// Same as `new` but with an explicit stride (interleaved buffers)
    pub fn with_stride(declaration: &VertexStreamDeclaration, stride: u32) -> Self {
        let packed = Self::new(declaration);
        Self::build(packed.streams, stride, declaration.step_function)
    }

    fn build(streams: Vec<VertexStream>, stride: u32, step_function: VertexStepFunction) -> Self {
        let mut hash = HashState::new();
        for stream in &streams {
            hash.update(&stream.name_hash)
                .update(&stream.size)
                .update(&stream.ty)
                .update(&stream.normalize)
                .update(&stream.offset);
        }
        hash.update(&stride);
        Self {
            streams,
            stride,
            step_function,
            pipeline_hash: hash.finish(),
        }
    }

    pub fn stream(&self, name_hash: u64) -> Option<&VertexStream> {
        self.streams.iter().find(|s| s.name_hash == name_hash)
    }
}

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;
