/// Fixed-function render state and the enums the state setters take
///
/// `PipelineState` is hashed into pipeline cache keys, so every field is
/// an integer or enum (no floats).

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    IncrWrap,
    DecrWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceType {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceWinding {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Points,
    Lines,
    Triangles,
    TriangleStrip,
}

/// Toggleable states of `enable_state` / `disable_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    DepthTest,
    ScissorTest,
    StencilTest,
    AlphaTest,
    Blend,
    CullFace,
    PolygonOffsetFill,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

/// Stencil operations for one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub func: CompareFunc,
    pub op_stencil_fail: StencilOp,
    pub op_depth_fail: StencilOp,
    pub op_pass: StencilOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            func: CompareFunc::Always,
            op_stencil_fail: StencilOp::Keep,
            op_depth_fail: StencilOp::Keep,
            op_pass: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub write_color_mask: ColorMask,
    pub write_depth: bool,
    pub depth_test_enabled: bool,
    pub depth_test_func: CompareFunc,
    pub stencil_enabled: bool,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub stencil_reference: u8,
    pub stencil_compare_mask: u8,
    pub stencil_write_mask: u8,
    pub blend_enabled: bool,
    pub blend_src_factor: BlendFactor,
    pub blend_dst_factor: BlendFactor,
    pub cull_face_enabled: bool,
    pub cull_face_type: FaceType,
    pub face_winding: FaceWinding,
    pub polygon_offset_fill_enabled: bool,
    pub scissor_enabled: bool,
    pub alpha_test_enabled: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            write_color_mask: ColorMask::all(),
            write_depth: true,
            depth_test_enabled: true,
            depth_test_func: CompareFunc::LessEqual,
            stencil_enabled: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_reference: 0,
            stencil_compare_mask: 0xff,
            stencil_write_mask: 0xff,
            blend_enabled: false,
            blend_src_factor: BlendFactor::One,
            blend_dst_factor: BlendFactor::Zero,
            cull_face_enabled: false,
            cull_face_type: FaceType::Back,
            face_winding: FaceWinding::Ccw,
            polygon_offset_fill_enabled: false,
            scissor_enabled: false,
            alpha_test_enabled: false,
        }
    }
}

impl PipelineState {
    pub fn set_state(&mut self, state: State, enabled: bool) {
        match state {
            State::DepthTest => self.depth_test_enabled = enabled,
            State::ScissorTest => self.scissor_enabled = enabled,
            State::StencilTest => self.stencil_enabled = enabled,
            State::AlphaTest => self.alpha_test_enabled = enabled,
            State::Blend => self.blend_enabled = enabled,
            State::CullFace => self.cull_face_enabled = enabled,
            State::PolygonOffsetFill => self.polygon_offset_fill_enabled = enabled,
        }
    }

    pub fn is_enabled(&self, state: State) -> bool {
        match state {
            State::DepthTest => self.depth_test_enabled,
            State::ScissorTest => self.scissor_enabled,
            State::StencilTest => self.stencil_enabled,
            State::AlphaTest => self.alpha_test_enabled,
            State::Blend => self.blend_enabled,
            State::CullFace => self.cull_face_enabled,
            State::PolygonOffsetFill => self.polygon_offset_fill_enabled,
        }
    }

    /// Apply the same stencil ops to the faces selected by `face`
    pub fn set_stencil_op(&mut self, face: FaceType, stencil_fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        let apply = |s: &mut StencilFaceState| {
            s.op_stencil_fail = stencil_fail;
            s.op_depth_fail = depth_fail;
            s.op_pass = pass;
        };
        match face {
            FaceType::Front => apply(&mut self.stencil_front),
            FaceType::Back => apply(&mut self.stencil_back),
            FaceType::FrontAndBack => {
                apply(&mut self.stencil_front);
                apply(&mut self.stencil_back);
            }
        }
    }

    pub fn set_stencil_func(&mut self, face: FaceType, func: CompareFunc, reference: u8, mask: u8) {
        match face {
            FaceType::Front => self.stencil_front.func = func,
            FaceType::Back => self.stencil_back.func = func,
            FaceType::FrontAndBack => {
                self.stencil_front.func = func;
                self.stencil_back.func = func;
            }
        }
        self.stencil_reference = reference;
        self.stencil_compare_mask = mask;
    }
}
