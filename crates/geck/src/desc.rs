//! Plain descriptions of the fixed-function pipeline state.
//!
//! `Default` values describe the pipeline every frame is drawn with:
//! triangle list, filled back-face culled clockwise triangles,
//! single sample, straight alpha blending into a cleared color target.

use crate::shader::ShaderStage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Point,
    Line,
    #[default]
    Triangle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrontFace {
    #[default]
    Clockwise,
    CounterClockwise,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Culling {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Blend {
    pub op: BlendOp,
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

bitflags::bitflags! {
    /// Mask for color blend write.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct WriteMask: u8 {
        const RED = 0x1;
        const GREEN = 0x2;
        const BLUE = 0x4;
        const ALPHA = 0x8;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub mask: WriteMask,
    pub color: Blend,
    pub alpha: Blend,
}

impl Default for BlendDesc {
    /// `color = src * src_alpha + dst * (1 - src_alpha)`, `alpha = src`.
    fn default() -> Self {
        BlendDesc {
            mask: WriteMask::all(),
            color: Blend {
                op: BlendOp::Add,
                src: BlendFactor::SrcAlpha,
                dst: BlendFactor::OneMinusSrcAlpha,
            },
            alpha: Blend {
                op: BlendOp::Add,
                src: BlendFactor::One,
                dst: BlendFactor::Zero,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterDesc {
    pub front_face: FrontFace,
    pub culling: Culling,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

/// Load and store behavior of the single color attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttachmentOps {
    pub load: LoadOp,
    pub store: StoreOp,
}

/// A push constant block visible to the given stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: &'static [ShaderStage],
    pub size: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub primitive_topology: PrimitiveTopology,
    pub raster: RasterDesc,
    /// `None` disables blending.
    pub blend: Option<BlendDesc>,
    pub attachment: AttachmentOps,
    /// `None` keeps the layout empty.
    pub push_constants: Option<PushConstantRange>,
}

impl Default for PipelineDesc {
    fn default() -> Self {
        PipelineDesc {
            primitive_topology: PrimitiveTopology::default(),
            raster: RasterDesc::default(),
            blend: Some(BlendDesc::default()),
            attachment: AttachmentOps::default(),
            push_constants: None,
        }
    }
}

impl PipelineDesc {
    pub fn with_push_constants(mut self, range: PushConstantRange) -> Self {
        self.push_constants = Some(range);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_desc() {
        let desc = PipelineDesc::default();
        assert_eq!(desc.primitive_topology, PrimitiveTopology::Triangle);
        assert_eq!(desc.raster.front_face, FrontFace::Clockwise);
        assert_eq!(desc.raster.culling, Culling::Back);
        assert_eq!(desc.attachment.load, LoadOp::Clear);
        assert_eq!(desc.attachment.store, StoreOp::Store);
        assert_eq!(desc.push_constants, None);

        let blend = desc.blend.unwrap();
        assert_eq!(blend.mask, WriteMask::all());
        assert_eq!(blend.color.src, BlendFactor::SrcAlpha);
        assert_eq!(blend.color.dst, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.alpha.src, BlendFactor::One);
        assert_eq!(blend.alpha.dst, BlendFactor::Zero);
    }

    #[test]
    fn push_constants_are_opt_in() {
        let range = PushConstantRange {
            stages: &[ShaderStage::Vertex],
            size: 16,
        };
        let desc = PipelineDesc::default().with_push_constants(range);
        assert_eq!(desc.push_constants, Some(range));
        assert_eq!(desc.blend, PipelineDesc::default().blend);
    }
}
