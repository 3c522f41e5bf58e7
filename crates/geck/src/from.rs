use ash::vk;

use crate::{
    adapter::AdapterKind,
    desc::{BlendFactor, BlendOp, Culling, FrontFace, LoadOp, PrimitiveTopology, StoreOp, WriteMask},
    shader::ShaderStage,
    surface::{Extent2, PresentMode, SurfaceCapabilities, SurfaceFormat},
};

macro_rules! from_flags {
    ($from:ty => $to:ty, [$($from_flag:ident => $to_flag:ident),* $(,)?], $flags:expr) => {{
        let mut dst = <$to>::empty();
        let src = $flags;
        $(
            if src.contains(<$from>::$from_flag) {
                dst |= <$to>::$to_flag;
            }
        )*
        dst
    }};
}

pub trait FromAsh<A> {
    fn from_ash(ash: A) -> Self;
}

pub trait AshInto<T> {
    fn ash_into(self) -> T;
}

impl<T, A> AshInto<T> for A
where
    T: FromAsh<A>,
{
    #[inline(always)]
    fn ash_into(self) -> T {
        T::from_ash(self)
    }
}

pub trait TryFromAsh<A>: Sized {
    fn try_from_ash(ash: A) -> Option<Self>;
}

pub trait TryAshInto<T> {
    fn try_ash_into(self) -> Option<T>;
}

impl<T, A> TryAshInto<T> for A
where
    T: TryFromAsh<A>,
{
    #[inline(always)]
    fn try_ash_into(self) -> Option<T> {
        T::try_from_ash(self)
    }
}

pub trait AshFrom<T> {
    fn ash_from(value: T) -> Self;
}

pub trait IntoAsh<A> {
    fn into_ash(self) -> A;
}

impl<A, T> IntoAsh<A> for T
where
    A: AshFrom<T>,
{
    #[inline(always)]
    fn into_ash(self) -> A {
        A::ash_from(self)
    }
}

impl FromAsh<vk::PhysicalDeviceType> for AdapterKind {
    #[inline(always)]
    fn from_ash(value: vk::PhysicalDeviceType) -> Self {
        match value {
            vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
            vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
            _ => AdapterKind::Other,
        }
    }
}

impl FromAsh<vk::Extent2D> for Extent2 {
    #[inline(always)]
    fn from_ash(value: vk::Extent2D) -> Self {
        Extent2::new(value.width, value.height)
    }
}

impl AshFrom<Extent2> for vk::Extent2D {
    #[inline(always)]
    fn ash_from(value: Extent2) -> Self {
        vk::Extent2D {
            width: value.width,
            height: value.height,
        }
    }
}

impl FromAsh<vk::SurfaceCapabilitiesKHR> for SurfaceCapabilities {
    fn from_ash(value: vk::SurfaceCapabilitiesKHR) -> Self {
        // `u32::MAX` width means the extent follows the window.
        let current_extent = if value.current_extent.width == u32::MAX {
            None
        } else {
            Some(value.current_extent.ash_into())
        };

        SurfaceCapabilities {
            min_image_count: value.min_image_count,
            max_image_count: value.max_image_count,
            current_extent,
            min_image_extent: value.min_image_extent.ash_into(),
            max_image_extent: value.max_image_extent.ash_into(),
            current_transform: value.current_transform,
            supported_usage: value.supported_usage_flags,
            supported_composite_alpha: value.supported_composite_alpha,
        }
    }
}

impl FromAsh<vk::SurfaceFormatKHR> for SurfaceFormat {
    #[inline(always)]
    fn from_ash(value: vk::SurfaceFormatKHR) -> Self {
        SurfaceFormat {
            format: value.format,
            color_space: value.color_space,
        }
    }
}

impl TryFromAsh<vk::PresentModeKHR> for PresentMode {
    #[inline(always)]
    fn try_from_ash(value: vk::PresentModeKHR) -> Option<Self> {
        match value {
            vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
            vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
            vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
            vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
            _ => None,
        }
    }
}

impl AshFrom<PresentMode> for vk::PresentModeKHR {
    #[inline(always)]
    fn ash_from(value: PresentMode) -> Self {
        match value {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

impl AshFrom<ShaderStage> for vk::ShaderStageFlags {
    #[inline(always)]
    fn ash_from(value: ShaderStage) -> Self {
        match value {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl AshFrom<&[ShaderStage]> for vk::ShaderStageFlags {
    fn ash_from(value: &[ShaderStage]) -> Self {
        value
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |flags, &stage| {
                flags | stage.into_ash()
            })
    }
}

impl AshFrom<PrimitiveTopology> for vk::PrimitiveTopology {
    #[inline(always)]
    fn ash_from(value: PrimitiveTopology) -> Self {
        match value {
            PrimitiveTopology::Point => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::Line => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

impl AshFrom<FrontFace> for vk::FrontFace {
    #[inline(always)]
    fn ash_from(value: FrontFace) -> Self {
        match value {
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

impl AshFrom<Culling> for vk::CullModeFlags {
    #[inline(always)]
    fn ash_from(value: Culling) -> Self {
        match value {
            Culling::None => vk::CullModeFlags::NONE,
            Culling::Front => vk::CullModeFlags::FRONT,
            Culling::Back => vk::CullModeFlags::BACK,
        }
    }
}

impl AshFrom<BlendFactor> for vk::BlendFactor {
    #[inline(always)]
    fn ash_from(value: BlendFactor) -> Self {
        match value {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

impl AshFrom<BlendOp> for vk::BlendOp {
    #[inline(always)]
    fn ash_from(value: BlendOp) -> Self {
        match value {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

impl AshFrom<WriteMask> for vk::ColorComponentFlags {
    #[inline(always)]
    fn ash_from(value: WriteMask) -> Self {
        from_flags!(WriteMask => vk::ColorComponentFlags, [
            RED => R,
            GREEN => G,
            BLUE => B,
            ALPHA => A,
        ], value)
    }
}

impl AshFrom<LoadOp> for vk::AttachmentLoadOp {
    #[inline(always)]
    fn ash_from(value: LoadOp) -> Self {
        match value {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl AshFrom<StoreOp> for vk::AttachmentStoreOp {
    #[inline(always)]
    fn ash_from(value: StoreOp) -> Self {
        match value {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_extent_sentinel() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            ..Default::default()
        };
        let caps: SurfaceCapabilities = caps.ash_into();
        assert_eq!(caps.current_extent, None);
        assert_eq!(caps.max_image_count, 0);

        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let caps: SurfaceCapabilities = caps.ash_into();
        assert_eq!(caps.current_extent, Some(Extent2::new(800, 600)));
    }

    #[test]
    fn write_mask_maps_every_channel() {
        let flags: vk::ColorComponentFlags = WriteMask::all().into_ash();
        assert_eq!(flags, vk::ColorComponentFlags::RGBA);

        let flags: vk::ColorComponentFlags = (WriteMask::RED | WriteMask::ALPHA).into_ash();
        assert_eq!(flags, vk::ColorComponentFlags::R | vk::ColorComponentFlags::A);
    }

    #[test]
    fn unknown_present_mode_is_skipped() {
        let mode: Option<PresentMode> = vk::PresentModeKHR::SHARED_DEMAND_REFRESH.try_ash_into();
        assert_eq!(mode, None);
        let mode: Option<PresentMode> = vk::PresentModeKHR::MAILBOX.try_ash_into();
        assert_eq!(mode, Some(PresentMode::Mailbox));
    }

    #[test]
    fn stage_list_to_flags() {
        let flags: vk::ShaderStageFlags =
            [ShaderStage::Vertex, ShaderStage::Fragment][..].into_ash();
        assert_eq!(
            flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }
}
