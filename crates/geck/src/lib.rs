//! Vulkan bootstrap: picks a GPU, negotiates a presentable swapchain
//! and assembles the graphics pipeline used to draw every frame.
//!
//! Construction follows a strict order:
//! [`DeviceContext`] -> [`Surface`] -> [`SwapChain`] -> [`Pipeline`].
//! Destruction runs in reverse. [`RenderContext`] drives the whole chain
//! for callers that do not need the individual steps.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod probe;

mod adapter;
mod config;
mod context;
mod desc;
mod device;
mod error;
mod from;
mod lifeline;
mod pipeline;
mod queue;
mod shader;
mod surface;
mod swapchain;

pub mod fs;

pub use ash::{self, vk};

pub use self::{
    adapter::{select_adapter, AdapterDescriptor, AdapterKind, Version},
    config::ContextConfig,
    context::{RenderContext, StageSource},
    desc::{
        AttachmentOps, Blend, BlendDesc, BlendFactor, BlendOp, Culling, FrontFace, LoadOp,
        PipelineDesc, PrimitiveTopology, PushConstantRange, RasterDesc, StoreOp, WriteMask,
    },
    device::{DeviceContext, DeviceState, Queues},
    error::{Error, Operation, PipelineError, Result, ShaderError, StillReferenced},
    lifeline::{Lifeline, Tether},
    pipeline::{Pipeline, ENTRY_POINT},
    queue::{
        queue_create_infos, select_queue_families, QueueFamilies, QueueFamilyInfo,
        QueueFamilySelection,
    },
    shader::{ShaderLanguage, ShaderModule, ShaderSource, ShaderStage},
    surface::{
        choose_composite_alpha, choose_extent, choose_present_mode, choose_surface_format,
        required_extensions, Extent2, PresentMode, Surface, SurfaceCapabilities, SurfaceFormat,
        SurfaceSupport,
    },
    swapchain::{image_count, Acquired, PresentStatus, Sharing, SwapChain, SwapChainPlan},
};
