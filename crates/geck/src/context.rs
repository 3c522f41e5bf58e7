use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::{
    config::ContextConfig,
    desc::PipelineDesc,
    device::{DeviceContext, Queues},
    error::{Error, Operation, Result},
    pipeline::Pipeline,
    shader::{ShaderModule, ShaderSource, ShaderStage},
    surface::{required_extensions, Extent2, Surface},
    swapchain::SwapChain,
};

/// Shader source for one pipeline stage.
#[derive(Clone, Debug)]
pub struct StageSource {
    pub stage: ShaderStage,
    pub source: ShaderSource<'static>,
}

/// Device, surface, swap chain and pipeline built together for one window.
pub struct RenderContext {
    pipeline: Option<Pipeline>,
    swap_chain: Option<SwapChain>,
    shaders: Vec<ShaderModule>,
    surface: Option<Surface>,
    desc: PipelineDesc,
    drawable: Extent2,
    device: DeviceContext,
}

impl RenderContext {
    /// Runs every initialization step in order.
    ///
    /// Whatever was built before a failing step is destroyed in reverse order.
    pub fn new<W>(
        window: &W,
        drawable: Extent2,
        config: ContextConfig,
        stages: &[StageSource],
        desc: PipelineDesc,
    ) -> Result<Self>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let validation = config.validation;
        let extensions = required_extensions(window)?;

        let mut context = RenderContext {
            pipeline: None,
            swap_chain: None,
            shaders: Vec::new(),
            surface: None,
            desc,
            drawable,
            device: DeviceContext::new(config)?,
        };

        context
            .device
            .create_top_level_handle(&extensions, validation)?;
        context.device.choose_adapter()?;

        let surface = context.surface.insert(Surface::new(&context.device, window)?);
        context.device.resolve_queue_families(surface)?;
        context.device.create_logical_device()?;

        for stage in stages {
            let module = ShaderModule::new(&context.device, stage.stage, &stage.source)?;
            context.shaders.push(module);
        }

        context.swap_chain = Some(SwapChain::build(&context.device, surface, drawable)?);
        context.build_pipeline()?;

        Ok(context)
    }

    fn build_pipeline(&mut self) -> Result<()> {
        let swap_chain = self.swap_chain.as_mut().ok_or(Error::OutOfOrder {
            operation: Operation::CreateGraphicsPipeline,
            state: self.device.state(),
        })?;

        let stages: Vec<&ShaderModule> = self.shaders.iter().collect();
        let pipeline = self.pipeline.insert(Pipeline::build_with(
            &self.device,
            swap_chain,
            &stages,
            &self.desc,
        )?);

        swap_chain.create_framebuffers(pipeline)
    }

    /// Rebuilds when `drawable` differs from the size the chain was built for.
    ///
    /// Returns `true` if the chain was rebuilt.
    pub fn resize(&mut self, drawable: Extent2) -> Result<bool> {
        if drawable == self.drawable {
            return Ok(false);
        }
        self.rebuild(drawable)
    }

    /// Rebuilds swap chain, pipeline and framebuffers.
    ///
    /// Zero-area sizes are remembered but not built, the current chain is kept
    /// until a usable size arrives. Returns `true` if the chain was rebuilt.
    pub fn rebuild(&mut self, drawable: Extent2) -> Result<bool> {
        self.drawable = drawable;
        if drawable.is_empty() {
            return Ok(false);
        }

        self.device
            .wait_idle()
            .map_err(|result| Error::Presentation {
                operation: Operation::WaitIdle,
                result,
            })?;

        if let Some(swap_chain) = &mut self.swap_chain {
            swap_chain.destroy_framebuffers();
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(err) = pipeline.destroy() {
                tracing::error!("{err}");
            }
        }

        let surface = self.surface.as_ref().ok_or(Error::OutOfOrder {
            operation: Operation::CreateSwapchain,
            state: self.device.state(),
        })?;

        if let Some(swap_chain) = &mut self.swap_chain {
            swap_chain.rebuild(&self.device, surface, drawable)?;
        } else {
            self.swap_chain = Some(SwapChain::build(&self.device, surface, drawable)?);
        }

        self.build_pipeline()?;
        Ok(true)
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn queues(&self) -> Option<Queues> {
        self.device.queues()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn swap_chain(&self) -> Option<&SwapChain> {
        self.swap_chain.as_ref()
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Size the chain was last requested for.
    pub fn drawable(&self) -> Extent2 {
        self.drawable
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(result) = self.device.wait_idle() {
            tracing::error!("failed to wait for device idle: {result}");
        }

        if let Some(swap_chain) = &mut self.swap_chain {
            swap_chain.destroy_framebuffers();
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(err) = pipeline.destroy() {
                tracing::error!("{err}");
            }
        }

        if let Some(mut swap_chain) = self.swap_chain.take() {
            swap_chain.destroy();
        }

        for mut shader in self.shaders.drain(..) {
            shader.destroy();
        }

        if let Some(mut surface) = self.surface.take() {
            if let Err(err) = surface.destroy() {
                tracing::error!("{err}");
            }
        }

        if let Err(err) = self.device.destroy() {
            tracing::error!("{err}");
        }
    }
}
