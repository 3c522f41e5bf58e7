use std::{fmt, path::PathBuf};

use ash::vk;

use crate::{device::DeviceState, shader::ShaderStage};

/// Native call that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    EnumerateLayers,
    EnumerateInstanceExtensions,
    CreateInstance,
    CreateDebugMessenger,
    EnumerateAdapters,
    EnumerateDeviceExtensions,
    QueryQueueFamilies,
    CreateDevice,
    CreateSurface,
    QuerySurfaceCapabilities,
    QuerySurfaceFormats,
    QueryPresentModes,
    CreateSwapchain,
    GetSwapchainImages,
    CreateImageView,
    CreateFramebuffer,
    AcquireImage,
    Present,
    WaitIdle,
    CreateRenderPass,
    CreatePipelineLayout,
    CreateGraphicsPipeline,
    CreateShaderModule,
    ChooseAdapter,
    ResolveQueueFamilies,
    AccessDevice,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::EnumerateLayers => "enumerate_layers",
            Operation::EnumerateInstanceExtensions => "enumerate_instance_extensions",
            Operation::CreateInstance => "create_instance",
            Operation::CreateDebugMessenger => "create_debug_messenger",
            Operation::EnumerateAdapters => "enumerate_adapters",
            Operation::EnumerateDeviceExtensions => "enumerate_device_extensions",
            Operation::QueryQueueFamilies => "query_queue_families",
            Operation::CreateDevice => "create_device",
            Operation::CreateSurface => "create_surface",
            Operation::QuerySurfaceCapabilities => "query_surface_capabilities",
            Operation::QuerySurfaceFormats => "query_surface_formats",
            Operation::QueryPresentModes => "query_present_modes",
            Operation::CreateSwapchain => "create_swapchain",
            Operation::GetSwapchainImages => "get_swapchain_images",
            Operation::CreateImageView => "create_image_view",
            Operation::CreateFramebuffer => "create_framebuffer",
            Operation::AcquireImage => "acquire_image",
            Operation::Present => "present",
            Operation::WaitIdle => "wait_idle",
            Operation::CreateRenderPass => "create_render_pass",
            Operation::CreatePipelineLayout => "create_pipeline_layout",
            Operation::CreateGraphicsPipeline => "create_graphics_pipeline",
            Operation::CreateShaderModule => "create_shader_module",
            Operation::ChooseAdapter => "choose_adapter",
            Operation::ResolveQueueFamilies => "resolve_queue_families",
            Operation::AccessDevice => "access_device",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load Vulkan entry points")]
    Loading(#[source] ash::LoadingError),

    #[error("{operation} failed: {result}")]
    Initialization {
        operation: Operation,
        result: vk::Result,
    },

    #[error("validation layers unavailable: {missing:?}")]
    ValidationLayersUnavailable { missing: Vec<String> },

    #[error("none of {candidates} adapters supports the required device extensions")]
    NoSuitableAdapter { candidates: usize },

    #[error("incomplete queue families (graphics: {graphics:?}, present: {present:?})")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("{operation} failed: {result}")]
    DeviceCreation {
        operation: Operation,
        result: vk::Result,
    },

    #[error("{operation} failed: {result}")]
    SurfaceCreation {
        operation: Operation,
        result: vk::Result,
    },

    #[error("{operation} failed: {result}")]
    SwapChainCreation {
        operation: Operation,
        result: vk::Result,
    },

    #[error("{operation} failed: {result}")]
    Presentation {
        operation: Operation,
        result: vk::Result,
    },

    #[error("{operation} failed")]
    PipelineCreation {
        operation: Operation,
        #[source]
        source: PipelineError,
    },

    #[error("failed to create shader module '{name}'")]
    ShaderCreation {
        name: String,
        #[source]
        source: ShaderError,
    },

    #[error("{operation} called while device context is {state:?}")]
    OutOfOrder {
        operation: Operation,
        state: DeviceState,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("missing {0} shader stage")]
    MissingStage(ShaderStage),

    #[error("more than one {0} shader stage")]
    DuplicateStage(ShaderStage),

    #[error(transparent)]
    Vulkan(#[from] vk::Result),
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to read shader file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SPIR-V code size {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("SPIR-V magic number mismatch")]
    BadMagic,

    #[error("non-utf8: {0}")]
    NonUtf8(#[from] std::str::Utf8Error),

    #[error("parse WGSL: {0}")]
    ParseWgsl(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("generate SPIR-V: {0}")]
    GenSpirV(#[from] naga::back::spv::Error),

    #[error(transparent)]
    Vulkan(#[from] vk::Result),
}

/// Returned when an owner is asked to destroy itself
/// while dependent objects still refer to it.
#[derive(Debug, thiserror::Error)]
#[error("{owner} is still referenced by {dependents} dependent object(s)")]
pub struct StillReferenced {
    pub owner: &'static str,
    pub dependents: usize,
}
