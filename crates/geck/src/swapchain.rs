use ash::{extensions::khr, vk};
use smallvec::SmallVec;

use crate::{
    device::{DeviceContext, DeviceState},
    error::{Error, Operation, Result},
    from::IntoAsh,
    lifeline::Tether,
    pipeline::Pipeline,
    queue::QueueFamilies,
    surface::{
        choose_composite_alpha, choose_extent, choose_present_mode, choose_surface_format, Extent2,
        PresentMode, Surface, SurfaceFormat, SurfaceSupport,
    },
};

/// Number of images to request: one more than the minimum,
/// but no more than the maximum unless it is unbounded (zero).
pub fn image_count(min_image_count: u32, max_image_count: u32) -> u32 {
    let count = min_image_count + 1;
    if max_image_count != 0 {
        count.min(max_image_count)
    } else {
        count
    }
}

/// How swapchain images are shared between queue families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sharing {
    Exclusive,
    /// Images are used by both families without ownership transfers.
    Concurrent([u32; 2]),
}

impl Sharing {
    pub fn for_families(families: &QueueFamilies) -> Self {
        if families.shared() {
            Sharing::Exclusive
        } else {
            Sharing::Concurrent([families.graphics, families.present])
        }
    }
}

/// Resolved swap chain parameters.
///
/// Equal inputs always produce an equal plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainPlan {
    pub image_count: u32,
    pub extent: Extent2,
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing: Sharing,
}

impl SwapChainPlan {
    /// Resolves the plan for a window with `drawable` size.
    ///
    /// Fails when the surface reports no formats or when the resulting
    /// extent has zero area, which happens while the window is minimized.
    pub fn new(
        support: &SurfaceSupport,
        drawable: Extent2,
        families: &QueueFamilies,
    ) -> Result<Self> {
        let capabilities = &support.capabilities;

        let format =
            choose_surface_format(&support.formats).ok_or(Error::SwapChainCreation {
                operation: Operation::QuerySurfaceFormats,
                result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
            })?;

        let extent = choose_extent(capabilities, drawable);
        if extent.is_empty() {
            return Err(Error::SwapChainCreation {
                operation: Operation::CreateSwapchain,
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            });
        }

        Ok(SwapChainPlan {
            image_count: image_count(capabilities.min_image_count, capabilities.max_image_count),
            extent,
            format,
            present_mode: choose_present_mode(&support.present_modes),
            transform: capabilities.current_transform,
            composite_alpha: choose_composite_alpha(capabilities.supported_composite_alpha),
            sharing: Sharing::for_families(families),
        })
    }

    fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHRBuilder<'_> {
        let builder = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent.into_ash())
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(self.transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.present_mode.into_ash())
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        match &self.sharing {
            Sharing::Exclusive => builder.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
            Sharing::Concurrent(families) => builder
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(families),
        }
    }
}

/// Outcome of acquiring the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Optimal(u32),
    /// Image can still be rendered and presented, but the chain should be rebuilt.
    Suboptimal(u32),
    OutOfDate,
}

impl Acquired {
    pub fn index(&self) -> Option<u32> {
        match *self {
            Acquired::Optimal(index) | Acquired::Suboptimal(index) => Some(index),
            Acquired::OutOfDate => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// Tethers a swap chain keeps on the objects it was built from.
#[derive(Debug, Default)]
struct Anchors {
    device: Option<Tether>,
    surface: Option<Tether>,
    pipeline: Option<Tether>,
}

impl Anchors {
    /// Checks that both owners are still alive before anything is created.
    fn owners(
        device: Option<Tether>,
        surface: Option<Tether>,
        state: DeviceState,
    ) -> Result<(Tether, Tether)> {
        let device = device.ok_or(Error::OutOfOrder {
            operation: Operation::CreateSwapchain,
            state,
        })?;
        let surface = surface.ok_or(Error::SwapChainCreation {
            operation: Operation::CreateSwapchain,
            result: vk::Result::ERROR_SURFACE_LOST_KHR,
        })?;
        Ok((device, surface))
    }

    fn hold(&mut self, (device, surface): (Tether, Tether)) {
        self.device = Some(device);
        self.surface = Some(surface);
    }

    fn release_pipeline(&mut self) {
        self.pipeline = None;
    }

    fn release_owners(&mut self) {
        self.surface = None;
        self.device = None;
    }
}

/// Chain of presentable images with their views and framebuffers.
pub struct SwapChain {
    device: ash::Device,
    loader: khr::Swapchain,
    handle: vk::SwapchainKHR,
    plan: SwapChainPlan,

    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,

    anchors: Anchors,
}

impl SwapChain {
    /// Creates the chain for `surface` and acquires its images and views.
    pub fn build(device: &DeviceContext, surface: &Surface, drawable: Extent2) -> Result<Self> {
        let logical = device.logical()?;
        let loader = device.swapchain_loader(Operation::CreateSwapchain)?.clone();

        let families = device.queue_families().ok_or(Error::OutOfOrder {
            operation: Operation::CreateSwapchain,
            state: device.state(),
        })?;

        let support = surface.support(device)?;
        let plan = SwapChainPlan::new(&support, drawable, &families)?;

        let mut swap_chain = SwapChain {
            device: logical.clone(),
            loader,
            handle: vk::SwapchainKHR::null(),
            plan,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            anchors: Anchors::default(),
        };

        swap_chain.create(device, surface)?;
        swap_chain.acquire_resources()?;
        Ok(swap_chain)
    }

    fn create(&mut self, device: &DeviceContext, surface: &Surface) -> Result<()> {
        let owners = Anchors::owners(device.tether(), surface.tether(), device.state())?;

        let create_info = self.plan.create_info(surface.handle());
        self.handle = unsafe { self.loader.create_swapchain(&create_info, None) }.map_err(
            |result| Error::SwapChainCreation {
                operation: Operation::CreateSwapchain,
                result,
            },
        )?;

        self.anchors.hold(owners);

        tracing::debug!(
            "created swapchain {}x{} {:?}/{:?} {:?}, {} image(s) requested",
            self.plan.extent.width,
            self.plan.extent.height,
            self.plan.format.format,
            self.plan.format.color_space,
            self.plan.present_mode,
            self.plan.image_count,
        );
        Ok(())
    }

    /// Pulls the chain's images and creates one 2D view for each.
    ///
    /// Does nothing if views already exist.
    pub fn acquire_resources(&mut self) -> Result<()> {
        if !self.views.is_empty() {
            return Ok(());
        }

        self.images = unsafe { self.loader.get_swapchain_images(self.handle) }.map_err(
            |result| Error::SwapChainCreation {
                operation: Operation::GetSwapchainImages,
                result,
            },
        )?;

        self.views.reserve(self.images.len());
        for &image in &self.images {
            let view = unsafe {
                self.device.create_image_view(
                    &vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(self.plan.format.format)
                        .components(vk::ComponentMapping::default())
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        }),
                    None,
                )
            }
            .map_err(|result| Error::SwapChainCreation {
                operation: Operation::CreateImageView,
                result,
            })?;

            self.views.push(view);
        }

        tracing::trace!("created {} swapchain image view(s)", self.views.len());
        Ok(())
    }

    /// Creates one framebuffer per image view against the pipeline's render pass.
    ///
    /// Existing framebuffers are destroyed first.
    pub fn create_framebuffers(&mut self, pipeline: &Pipeline) -> Result<()> {
        self.destroy_framebuffers();

        if !pipeline.is_compatible(self) {
            return Err(Error::SwapChainCreation {
                operation: Operation::CreateFramebuffer,
                result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
            });
        }

        let tether = pipeline.tether().ok_or(Error::SwapChainCreation {
            operation: Operation::CreateFramebuffer,
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        })?;
        self.anchors.pipeline = Some(tether);

        self.framebuffers.reserve(self.views.len());
        for &view in &self.views {
            let attachments = [view];
            let framebuffer = unsafe {
                self.device.create_framebuffer(
                    &vk::FramebufferCreateInfo::builder()
                        .render_pass(pipeline.render_pass())
                        .attachments(&attachments)
                        .width(self.plan.extent.width)
                        .height(self.plan.extent.height)
                        .layers(1),
                    None,
                )
            }
            .map_err(|result| Error::SwapChainCreation {
                operation: Operation::CreateFramebuffer,
                result,
            })?;

            self.framebuffers.push(framebuffer);
        }

        tracing::trace!("created {} framebuffer(s)", self.framebuffers.len());
        Ok(())
    }

    /// Destroys framebuffers and releases the pipeline they were created for.
    pub fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.destroy_framebuffer(framebuffer, None) };
        }
        self.anchors.release_pipeline();
    }

    /// Destroys the chain and builds a new one for the current surface state.
    ///
    /// Framebuffers are not recreated.
    pub fn rebuild(
        &mut self,
        device: &DeviceContext,
        surface: &Surface,
        drawable: Extent2,
    ) -> Result<()> {
        let families = device.queue_families().ok_or(Error::OutOfOrder {
            operation: Operation::CreateSwapchain,
            state: device.state(),
        })?;

        let support = surface.support(device)?;
        let plan = SwapChainPlan::new(&support, drawable, &families)?;

        self.destroy();
        self.plan = plan;
        self.create(device, surface)?;
        self.acquire_resources()
    }

    /// Destroys framebuffers, image views and the chain, in that order.
    ///
    /// Images are owned by the chain and go with it. Calling it again is a no-op.
    pub fn destroy(&mut self) {
        self.destroy_framebuffers();

        for view in self.views.drain(..) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.images.clear();

        if self.handle != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.handle, None) };
            tracing::trace!("destroyed swapchain {:?}", self.handle);
            self.handle = vk::SwapchainKHR::null();
        }

        self.anchors.release_owners();
    }

    /// Acquires the next image, signaling `semaphore` once it can be rendered to.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Acquired> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, false)) => Ok(Acquired::Optimal(index)),
            Ok((index, true)) => Ok(Acquired::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(result) => Err(Error::Presentation {
                operation: Operation::AcquireImage,
                result,
            }),
        }
    }

    /// Queues image `index` for presentation after `wait` semaphores are signaled.
    pub fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait: &[vk::Semaphore],
    ) -> Result<PresentStatus> {
        let swapchains = [self.handle];
        let indices = [index];

        let result = unsafe {
            self.loader.queue_present(
                queue,
                &vk::PresentInfoKHR::builder()
                    .wait_semaphores(wait)
                    .swapchains(&swapchains)
                    .image_indices(&indices),
            )
        };

        match result {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(result) => Err(Error::Presentation {
                operation: Operation::Present,
                result,
            }),
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn plan(&self) -> &SwapChainPlan {
        &self.plan
    }

    pub fn extent(&self) -> Extent2 {
        self.plan.extent
    }

    pub fn format(&self) -> SurfaceFormat {
        self.plan.format
    }

    pub fn present_mode(&self) -> PresentMode {
        self.plan.present_mode
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    /// Queue families that touch the images.
    pub fn sharing_families(&self) -> SmallVec<[u32; 2]> {
        match self.plan.sharing {
            Sharing::Exclusive => SmallVec::new(),
            Sharing::Concurrent(families) => SmallVec::from_buf(families),
        }
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lifeline::Lifeline, surface::SurfaceCapabilities};

    fn support(current_extent: Option<Extent2>, formats: Vec<SurfaceFormat>) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 0,
                current_extent,
                min_image_extent: Extent2::new(1, 1),
                max_image_extent: Extent2::new(8192, 8192),
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE
                    | vk::CompositeAlphaFlagsKHR::INHERIT,
            },
            formats,
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
        }
    }

    const SHARED: QueueFamilies = QueueFamilies {
        graphics: 0,
        present: 0,
    };

    const SPLIT: QueueFamilies = QueueFamilies {
        graphics: 0,
        present: 2,
    };

    #[test]
    fn image_count_clamping() {
        assert_eq!(image_count(2, 4), 3);
        assert_eq!(image_count(4, 4), 4);
        assert_eq!(image_count(2, 0), 3);
        assert_eq!(image_count(1, 1), 1);
    }

    #[test]
    fn sharing_follows_families() {
        assert_eq!(Sharing::for_families(&SHARED), Sharing::Exclusive);
        assert_eq!(Sharing::for_families(&SPLIT), Sharing::Concurrent([0, 2]));
    }

    #[test]
    fn plan_resolves_every_choice() {
        let plan = SwapChainPlan::new(
            &support(None, vec![SurfaceFormat::PREFERRED]),
            Extent2::new(800, 600),
            &SPLIT,
        )
        .unwrap();

        assert_eq!(plan.image_count, 3);
        assert_eq!(plan.extent, Extent2::new(800, 600));
        assert_eq!(plan.format, SurfaceFormat::PREFERRED);
        assert_eq!(plan.present_mode, PresentMode::Mailbox);
        assert_eq!(plan.sharing, Sharing::Concurrent([0, 2]));
    }

    #[test]
    fn replanning_same_inputs_is_idempotent() {
        let support = support(Some(Extent2::new(1280, 720)), vec![SurfaceFormat::PREFERRED]);
        let first = SwapChainPlan::new(&support, Extent2::new(640, 480), &SHARED).unwrap();
        let second = SwapChainPlan::new(&support, Extent2::new(640, 480), &SHARED).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.extent, Extent2::new(1280, 720));
    }

    #[test]
    fn no_formats_is_an_error() {
        let support = support(None, Vec::new());
        let result = SwapChainPlan::new(&support, Extent2::new(800, 600), &SHARED);
        assert!(matches!(
            result,
            Err(Error::SwapChainCreation {
                operation: Operation::QuerySurfaceFormats,
                ..
            })
        ));
    }

    #[test]
    fn minimized_window_is_not_buildable() {
        let mut support = support(None, vec![SurfaceFormat::PREFERRED]);
        support.capabilities.min_image_extent = Extent2::new(0, 0);
        let result = SwapChainPlan::new(&support, Extent2::new(0, 0), &SHARED);
        assert!(result.is_err());
    }

    #[test]
    fn create_info_reflects_sharing() {
        let plan = SwapChainPlan::new(
            &support(None, vec![SurfaceFormat::PREFERRED]),
            Extent2::new(800, 600),
            &SPLIT,
        )
        .unwrap();
        let info = plan.create_info(vk::SurfaceKHR::null());
        assert_eq!(info.image_sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        assert_eq!(info.old_swapchain, vk::SwapchainKHR::null());
        assert_eq!(info.clipped, vk::TRUE);

        let plan = SwapChainPlan {
            sharing: Sharing::Exclusive,
            ..plan
        };
        let info = plan.create_info(vk::SurfaceKHR::null());
        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);
    }

    #[test]
    fn composite_alpha_follows_surface() {
        let mut support = support(None, vec![SurfaceFormat::PREFERRED]);
        let plan = SwapChainPlan::new(&support, Extent2::new(800, 600), &SHARED).unwrap();
        assert_eq!(plan.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);

        support.capabilities.supported_composite_alpha =
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED | vk::CompositeAlphaFlagsKHR::INHERIT;
        let plan = SwapChainPlan::new(&support, Extent2::new(800, 600), &SHARED).unwrap();
        assert_eq!(
            plan.composite_alpha,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );

        let info = plan.create_info(vk::SurfaceKHR::null());
        assert_eq!(
            info.composite_alpha,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );
    }

    #[test]
    fn owners_stay_tethered_until_destroy() {
        let mut device = Lifeline::new("device context");
        let mut surface = Lifeline::new("surface");
        let mut pipeline = Lifeline::new("pipeline");

        let mut anchors = Anchors::default();
        let owners =
            Anchors::owners(device.tether(), surface.tether(), DeviceState::Ready).unwrap();
        anchors.hold(owners);
        anchors.pipeline = pipeline.tether();

        assert_eq!(device.dependents(), 1);
        assert_eq!(surface.dependents(), 1);
        assert_eq!(pipeline.dependents(), 1);
        assert!(device.release().is_err());
        assert!(surface.release().is_err());

        // Framebuffers go first and let the pipeline go.
        anchors.release_pipeline();
        pipeline.release().unwrap();
        assert_eq!(device.dependents(), 1);

        anchors.release_owners();
        assert_eq!(device.dependents(), 0);
        surface.release().unwrap();
        device.release().unwrap();
    }

    #[test]
    fn released_owners_are_rejected() {
        let mut device = Lifeline::new("device context");
        let mut surface = Lifeline::new("surface");

        surface.release().unwrap();
        let result = Anchors::owners(device.tether(), surface.tether(), DeviceState::Ready);
        assert!(matches!(
            result,
            Err(Error::SwapChainCreation {
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
                ..
            })
        ));
        assert_eq!(device.dependents(), 0);

        device.release().unwrap();
        let result = Anchors::owners(device.tether(), None, DeviceState::Destroyed);
        assert!(matches!(
            result,
            Err(Error::OutOfOrder {
                operation: Operation::CreateSwapchain,
                state: DeviceState::Destroyed,
            })
        ));
    }
}
