use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use geck::{
    ash, vk, Acquired, Extent2, Pipeline, PresentStatus, PushConstantRange, RenderContext,
    ShaderStage, SwapChain, Tether,
};
use miette::IntoDiagnostic as _;

use crate::game::{Rect, Transform};

pub const FRAMES_IN_FLIGHT: usize = 2;

/// Push constant block shared by both rect shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RectConstants {
    /// x, y, width, height in pixels.
    pub bounds: [f32; 4],
    pub color: [f32; 4],
    /// Framebuffer size in pixels.
    pub extent: [f32; 2],
    pub _pad: [f32; 2],
}

impl RectConstants {
    pub const RANGE: PushConstantRange = PushConstantRange {
        stages: &[ShaderStage::Vertex, ShaderStage::Fragment],
        size: size_of::<RectConstants>() as u32,
    };

    pub fn new(transform: &Transform, rect: &Rect, extent: Extent2) -> Self {
        let [x, y] = transform.position;
        let [width, height] = rect.size;

        RectConstants {
            bounds: [x, y, width, height],
            color: rect.color,
            extent: [extent.width as f32, extent.height as f32],
            _pad: [0.0; 2],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Nothing to draw into, e.g. the window is minimized.
    Skipped,
    /// The swap chain no longer matches the surface and must be rebuilt.
    Stale,
}

fn frame_status(acquired: Acquired, presented: PresentStatus) -> FrameStatus {
    match (acquired, presented) {
        (Acquired::Optimal(_), PresentStatus::Optimal) => FrameStatus::Presented,
        _ => FrameStatus::Stale,
    }
}

#[derive(Clone, Copy)]
struct Frame {
    command_buffer: vk::CommandBuffer,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Records and submits one command buffer per frame in flight.
pub struct Renderer {
    device: ash::Device,
    pool: vk::CommandPool,
    frames: Vec<Frame>,
    current: usize,
    clear_color: [f32; 4],
    _device: Option<Tether>,
}

impl Renderer {
    pub fn new(context: &RenderContext, clear_color: [f32; 4]) -> miette::Result<Self> {
        let device = context.device().logical().into_diagnostic()?.clone();
        let families = context
            .device()
            .queue_families()
            .ok_or_else(|| miette::miette!("queue families are not resolved"))?;

        let mut renderer = Renderer {
            device,
            pool: vk::CommandPool::null(),
            frames: Vec::with_capacity(FRAMES_IN_FLIGHT),
            current: 0,
            clear_color,
            _device: context.device().tether(),
        };

        renderer.pool = unsafe {
            renderer.device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(families.graphics),
                None,
            )
        }
        .into_diagnostic()?;

        let command_buffers = unsafe {
            renderer.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(renderer.pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(FRAMES_IN_FLIGHT as u32),
            )
        }
        .into_diagnostic()?;

        for command_buffer in command_buffers {
            renderer.frames.push(Frame {
                command_buffer,
                image_available: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight: vk::Fence::null(),
            });

            let device = &renderer.device;
            let last = renderer.frames.len() - 1;
            let frame = &mut renderer.frames[last];

            unsafe {
                frame.image_available = device
                    .create_semaphore(&vk::SemaphoreCreateInfo::builder(), None)
                    .into_diagnostic()?;
                frame.render_finished = device
                    .create_semaphore(&vk::SemaphoreCreateInfo::builder(), None)
                    .into_diagnostic()?;
                frame.in_flight = device
                    .create_fence(
                        &vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED),
                        None,
                    )
                    .into_diagnostic()?;
            }
        }

        tracing::debug!("renderer ready with {} frames in flight", renderer.frames.len());
        Ok(renderer)
    }

    /// Draws every sprite and presents the result.
    pub fn draw(
        &mut self,
        context: &RenderContext,
        sprites: &[(Transform, Rect)],
    ) -> miette::Result<FrameStatus> {
        let (Some(swap_chain), Some(pipeline), Some(queues)) =
            (context.swap_chain(), context.pipeline(), context.queues())
        else {
            return Ok(FrameStatus::Skipped);
        };

        if context.drawable().is_empty() {
            return Ok(FrameStatus::Skipped);
        }

        let frame = self.frames[self.current];

        unsafe {
            self.device
                .wait_for_fences(&[frame.in_flight], true, u64::MAX)
                .into_diagnostic()?;
        }

        let acquired = swap_chain
            .acquire_next_image(frame.image_available)
            .into_diagnostic()?;

        let Some(index) = acquired.index() else {
            return Ok(FrameStatus::Stale);
        };

        let extent = swap_chain.extent();
        let rects: Vec<RectConstants> = sprites
            .iter()
            .map(|(transform, rect)| RectConstants::new(transform, rect, extent))
            .collect();

        unsafe {
            self.device
                .reset_fences(&[frame.in_flight])
                .into_diagnostic()?;
        }

        self.record(frame.command_buffer, swap_chain, pipeline, index, &rects)?;

        let wait = [frame.image_available];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal = [frame.render_finished];

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal);

        unsafe {
            self.device
                .queue_submit(queues.graphics, &[submit.build()], frame.in_flight)
                .into_diagnostic()?;
        }

        let presented = swap_chain
            .present(queues.present, index, &signal)
            .into_diagnostic()?;

        self.current = (self.current + 1) % self.frames.len();
        Ok(frame_status(acquired, presented))
    }

    fn record(
        &self,
        command_buffer: vk::CommandBuffer,
        swap_chain: &SwapChain,
        pipeline: &Pipeline,
        index: u32,
        rects: &[RectConstants],
    ) -> miette::Result<()> {
        let framebuffer = *swap_chain
            .framebuffers()
            .get(index as usize)
            .ok_or_else(|| miette::miette!("no framebuffer for image {index}"))?;

        let Extent2 { width, height } = swap_chain.extent();
        let area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: vk::Extent2D { width, height },
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        let device = &self.device;
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .into_diagnostic()?;
            device
                .begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::builder()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .into_diagnostic()?;

            device.cmd_begin_render_pass(
                command_buffer,
                &vk::RenderPassBeginInfo::builder()
                    .render_pass(pipeline.render_pass())
                    .framebuffer(framebuffer)
                    .render_area(area)
                    .clear_values(&clear),
                vk::SubpassContents::INLINE,
            );
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[area]);

            for rect in rects {
                device.cmd_push_constants(
                    command_buffer,
                    pipeline.layout(),
                    pipeline.push_constant_stages(),
                    0,
                    bytemuck::bytes_of(rect),
                );
                device.cmd_draw(command_buffer, 6, 1, 0, 0);
            }

            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer).into_diagnostic()?;
        }

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            if let Err(result) = self.device.device_wait_idle() {
                tracing::error!("failed to wait for device idle: {result}");
            }

            for frame in self.frames.drain(..) {
                self.device.destroy_semaphore(frame.image_available, None);
                self.device.destroy_semaphore(frame.render_finished, None);
                self.device.destroy_fence(frame.in_flight, None);
            }

            // Frees the command buffers as well.
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_range() {
        assert_eq!(size_of::<RectConstants>(), 48);
        assert_eq!(RectConstants::RANGE.size, 48);
        assert_eq!(
            bytemuck::bytes_of(&RectConstants::default()).len() as u32,
            RectConstants::RANGE.size
        );
    }

    #[test]
    fn constants_from_sprite() {
        let transform = Transform {
            position: [10.0, 20.0],
        };
        let rect = Rect {
            size: [30.0, 40.0],
            color: [0.1, 0.2, 0.3, 1.0],
        };

        let constants = RectConstants::new(&transform, &rect, Extent2::new(640, 480));
        assert_eq!(constants.bounds, [10.0, 20.0, 30.0, 40.0]);
        assert_eq!(constants.color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(constants.extent, [640.0, 480.0]);
    }

    #[test]
    fn anything_but_optimal_is_stale() {
        assert_eq!(
            frame_status(Acquired::Optimal(0), PresentStatus::Optimal),
            FrameStatus::Presented
        );
        assert_eq!(
            frame_status(Acquired::Suboptimal(1), PresentStatus::Optimal),
            FrameStatus::Stale
        );
        assert_eq!(
            frame_status(Acquired::Optimal(1), PresentStatus::Suboptimal),
            FrameStatus::Stale
        );
        assert_eq!(
            frame_status(Acquired::Optimal(2), PresentStatus::OutOfDate),
            FrameStatus::Stale
        );
    }
}
