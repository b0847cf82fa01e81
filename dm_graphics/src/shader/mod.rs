/// Shader reflection model and program binding resolution

pub mod program_layout;
pub mod shader_meta;

pub use program_layout::*;
pub use shader_meta::*;
