use std::ffi::CStr;

use ash::vk;
use smallvec::SmallVec;

use crate::{
    desc::{AttachmentOps, BlendDesc, LoadOp, PipelineDesc, PrimitiveTopology, RasterDesc},
    device::DeviceContext,
    error::{Error, Operation, PipelineError, Result, StillReferenced},
    from::IntoAsh,
    lifeline::{Lifeline, Tether},
    shader::{ShaderModule, ShaderStage},
    swapchain::SwapChain,
};

/// Entry point every shader stage is expected to export.
pub const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Immutable graphics pipeline with its layout and render pass.
///
/// Valid only for swap chains with the format it was built against.
pub struct Pipeline {
    device: ash::Device,
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    format: vk::Format,
    desc: PipelineDesc,
    lifeline: Lifeline,
    _device: Option<Tether>,
}

impl Pipeline {
    /// Builds the pipeline with default fixed-function state.
    pub fn build(
        device: &DeviceContext,
        swap_chain: &SwapChain,
        stages: &[&ShaderModule],
    ) -> Result<Self> {
        Pipeline::build_with(device, swap_chain, stages, &PipelineDesc::default())
    }

    /// Builds render pass, layout and pipeline in that order.
    ///
    /// `stages` must hold exactly one vertex and one fragment stage.
    /// Objects already created are destroyed if a later step fails.
    pub fn build_with(
        device: &DeviceContext,
        swap_chain: &SwapChain,
        stages: &[&ShaderModule],
        desc: &PipelineDesc,
    ) -> Result<Self> {
        let stage_kinds: SmallVec<[ShaderStage; 2]> =
            stages.iter().map(|module| module.stage()).collect();
        validate_stages(&stage_kinds).map_err(|source| Error::PipelineCreation {
            operation: Operation::CreateGraphicsPipeline,
            source,
        })?;

        let logical = device.logical()?;
        let tether = device.tether().ok_or(Error::OutOfOrder {
            operation: Operation::CreateGraphicsPipeline,
            state: device.state(),
        })?;

        let mut pipeline = Pipeline {
            device: logical.clone(),
            handle: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            format: swap_chain.format().format,
            desc: *desc,
            lifeline: Lifeline::new("pipeline"),
            _device: Some(tether),
        };

        pipeline.render_pass = pipeline.create_render_pass()?;
        pipeline.layout = pipeline.create_layout()?;
        pipeline.handle = pipeline.create_pipeline(stages)?;

        tracing::debug!(
            "built pipeline for {:?} with {} stage(s)",
            pipeline.format,
            stages.len()
        );

        Ok(pipeline)
    }

    fn create_render_pass(&self) -> Result<vk::RenderPass> {
        let attachments = [color_attachment(self.format, self.desc.attachment)];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];

        let dependencies = [vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        let render_pass = unsafe {
            self.device.create_render_pass(
                &vk::RenderPassCreateInfo::builder()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .dependencies(&dependencies),
                None,
            )
        }
        .map_err(|result| Error::PipelineCreation {
            operation: Operation::CreateRenderPass,
            source: result.into(),
        })?;

        tracing::trace!("created render pass {:?}", render_pass);
        Ok(render_pass)
    }

    fn create_layout(&self) -> Result<vk::PipelineLayout> {
        let ranges = push_constant_ranges(&self.desc);

        let layout = unsafe {
            self.device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&ranges),
                None,
            )
        }
        .map_err(|result| Error::PipelineCreation {
            operation: Operation::CreatePipelineLayout,
            source: result.into(),
        })?;

        tracing::trace!("created pipeline layout {:?}", layout);
        Ok(layout)
    }

    fn create_pipeline(&self, stages: &[&ShaderModule]) -> Result<vk::Pipeline> {
        let stage_infos: SmallVec<[vk::PipelineShaderStageCreateInfo; 2]> = stages
            .iter()
            .map(|module| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(module.stage().into_ash())
                    .module(module.handle())
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();
        let input_assembly = input_assembly_state(self.desc.primitive_topology);
        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = rasterization_state(&self.desc.raster);
        let multisample = multisample_state();

        let blend_attachments = [color_blend_attachment(self.desc.blend.as_ref())];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(self.layout)
            .render_pass(self.render_pass)
            .subpass(0)
            .build();

        let result = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
        };

        let pipelines = result.map_err(|(_, result)| Error::PipelineCreation {
            operation: Operation::CreateGraphicsPipeline,
            source: result.into(),
        })?;

        pipelines
            .into_iter()
            .next()
            .ok_or(Error::PipelineCreation {
                operation: Operation::CreateGraphicsPipeline,
                source: PipelineError::Vulkan(vk::Result::ERROR_UNKNOWN),
            })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Color attachment format the render pass was built for.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn desc(&self) -> &PipelineDesc {
        &self.desc
    }

    /// Stages the push constant block is visible to, empty without one.
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        match &self.desc.push_constants {
            Some(range) => range.stages.into_ash(),
            None => vk::ShaderStageFlags::empty(),
        }
    }

    pub fn is_compatible(&self, swap_chain: &SwapChain) -> bool {
        self.format == swap_chain.format().format
    }

    /// Registers a dependent of the render pass, such as a framebuffer set.
    pub fn tether(&self) -> Option<Tether> {
        self.lifeline.tether()
    }

    /// Destroys pipeline, layout and render pass, in that order.
    ///
    /// Refuses while framebuffers created for this pipeline are alive.
    /// Calling it again is a no-op.
    pub fn destroy(&mut self) -> Result<(), StillReferenced> {
        self.lifeline.release()?;

        if self.handle != vk::Pipeline::null() {
            unsafe { self.device.destroy_pipeline(self.handle, None) };
            self.handle = vk::Pipeline::null();
        }

        if self.layout != vk::PipelineLayout::null() {
            unsafe { self.device.destroy_pipeline_layout(self.layout, None) };
            self.layout = vk::PipelineLayout::null();
        }

        if self.render_pass != vk::RenderPass::null() {
            unsafe { self.device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
            tracing::trace!("destroyed pipeline");
        }

        self._device = None;
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::error!("leaking pipeline: {err}");
        }
    }
}

/// Requires exactly one vertex and one fragment stage.
fn validate_stages(stages: &[ShaderStage]) -> Result<(), PipelineError> {
    for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
        match stages.iter().filter(|&&s| s == stage).count() {
            0 => return Err(PipelineError::MissingStage(stage)),
            1 => {}
            _ => return Err(PipelineError::DuplicateStage(stage)),
        }
    }
    Ok(())
}

fn color_attachment(format: vk::Format, ops: AttachmentOps) -> vk::AttachmentDescription {
    // Loading requires the previous frame's contents to survive.
    let initial_layout = match ops.load {
        LoadOp::Load => vk::ImageLayout::PRESENT_SRC_KHR,
        LoadOp::Clear | LoadOp::DontCare => vk::ImageLayout::UNDEFINED,
    };

    vk::AttachmentDescription {
        flags: vk::AttachmentDescriptionFlags::empty(),
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: ops.load.into_ash(),
        store_op: ops.store.into_ash(),
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

fn input_assembly_state(topology: PrimitiveTopology) -> vk::PipelineInputAssemblyStateCreateInfo {
    vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(topology.into_ash())
        .primitive_restart_enable(false)
        .build()
}

fn rasterization_state(raster: &RasterDesc) -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(raster.culling.into_ash())
        .front_face(raster.front_face.into_ash())
        .depth_bias_enable(false)
        .line_width(1.0)
        .build()
}

fn multisample_state() -> vk::PipelineMultisampleStateCreateInfo {
    vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false)
        .alpha_to_coverage_enable(false)
        .alpha_to_one_enable(false)
        .build()
}

fn color_blend_attachment(blend: Option<&BlendDesc>) -> vk::PipelineColorBlendAttachmentState {
    match blend {
        None => vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        },
        Some(blend) => vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: blend.color.src.into_ash(),
            dst_color_blend_factor: blend.color.dst.into_ash(),
            color_blend_op: blend.color.op.into_ash(),
            src_alpha_blend_factor: blend.alpha.src.into_ash(),
            dst_alpha_blend_factor: blend.alpha.dst.into_ash(),
            alpha_blend_op: blend.alpha.op.into_ash(),
            color_write_mask: blend.mask.into_ash(),
        },
    }
}

fn push_constant_ranges(desc: &PipelineDesc) -> SmallVec<[vk::PushConstantRange; 1]> {
    desc.push_constants
        .iter()
        .map(|range| vk::PushConstantRange {
            stage_flags: range.stages.into_ash(),
            offset: 0,
            size: range.size,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{Culling, PushConstantRange, StoreOp};

    #[test]
    fn entry_point_is_main() {
        assert_eq!(ENTRY_POINT.to_str().unwrap(), "main");
        assert_eq!(ENTRY_POINT.to_str().unwrap(), crate::shader::ENTRY_POINT_NAME);
    }

    #[test]
    fn stage_list_must_be_complete() {
        use ShaderStage::*;

        assert!(validate_stages(&[Vertex, Fragment]).is_ok());
        assert!(validate_stages(&[Fragment, Vertex]).is_ok());
        assert!(matches!(
            validate_stages(&[Vertex]),
            Err(PipelineError::MissingStage(Fragment))
        ));
        assert!(matches!(
            validate_stages(&[]),
            Err(PipelineError::MissingStage(Vertex))
        ));
        assert!(matches!(
            validate_stages(&[Vertex, Fragment, Vertex]),
            Err(PipelineError::DuplicateStage(Vertex))
        ));
    }

    #[test]
    fn default_attachment_clears_and_presents() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_SRGB, AttachmentOps::default());
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(attachment.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let attachment = color_attachment(
            vk::Format::B8G8R8A8_SRGB,
            AttachmentOps {
                load: LoadOp::Load,
                store: StoreOp::Store,
            },
        );
        assert_eq!(attachment.initial_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn default_fixed_function_state() {
        let desc = PipelineDesc::default();

        let input = input_assembly_state(desc.primitive_topology);
        assert_eq!(input.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(input.primitive_restart_enable, vk::FALSE);

        let raster = rasterization_state(&desc.raster);
        assert_eq!(raster.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(raster.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(raster.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(raster.depth_bias_enable, vk::FALSE);
        assert_eq!(raster.depth_clamp_enable, vk::FALSE);
        assert_eq!(raster.line_width, 1.0);

        let multisample = multisample_state();
        assert_eq!(multisample.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(multisample.alpha_to_coverage_enable, vk::FALSE);

        assert!(push_constant_ranges(&desc).is_empty());
    }

    #[test]
    fn default_blend_is_straight_alpha() {
        let desc = PipelineDesc::default();
        let blend = color_blend_attachment(desc.blend.as_ref());

        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(blend.alpha_blend_op, vk::BlendOp::ADD);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);

        let opaque = color_blend_attachment(None);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn custom_desc_flows_into_state() {
        let desc = PipelineDesc {
            raster: RasterDesc {
                culling: Culling::None,
                ..RasterDesc::default()
            },
            ..PipelineDesc::default()
        }
        .with_push_constants(PushConstantRange {
            stages: &[ShaderStage::Vertex, ShaderStage::Fragment],
            size: 48,
        });

        assert_eq!(rasterization_state(&desc.raster).cull_mode, vk::CullModeFlags::NONE);

        let ranges = push_constant_ranges(&desc);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].size, 48);
        assert_eq!(
            ranges[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }
}
