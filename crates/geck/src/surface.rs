use std::ffi::CStr;

use ash::{extensions::khr, vk};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::{
    device::DeviceContext,
    error::{Error, Operation, Result, StillReferenced},
    lifeline::{Lifeline, Tether},
    probe,
};

/// Size of a 2D image in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent2 {
    pub width: u32,
    pub height: u32,
}

impl Extent2 {
    pub const fn new(width: u32, height: u32) -> Self {
        Extent2 { width, height }
    }

    /// Minimized windows report zero-area drawables.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
}

impl SurfaceFormat {
    pub const PREFERRED: SurfaceFormat = SurfaceFormat {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// Zero means there is no upper bound.
    pub max_image_count: u32,
    /// `None` when the extent is derived from the window size.
    pub current_extent: Option<Extent2>,
    pub min_image_extent: Extent2,
    pub max_image_extent: Extent2,
    pub current_transform: vk::SurfaceTransformFlagsKHR,
    pub supported_usage: vk::ImageUsageFlags,
    pub supported_composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Snapshot of everything the surface supports on the chosen adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Extent of swapchain images for a window with `drawable` size.
///
/// Platform-dictated extent is used verbatim.
/// Otherwise `drawable` is clamped into the supported range.
pub fn choose_extent(capabilities: &SurfaceCapabilities, drawable: Extent2) -> Extent2 {
    match capabilities.current_extent {
        Some(extent) => extent,
        None => Extent2 {
            width: drawable.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        },
    }
}

/// 8-bit sRGB RGBA in the non-linear sRGB color space if available,
/// otherwise the first format. `None` only for an empty list.
pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    formats
        .iter()
        .find(|&&format| format == SurfaceFormat::PREFERRED)
        .or_else(|| formats.first())
        .copied()
}

/// Opaque if supported, otherwise the lowest supported mode.
pub fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    if supported.contains(vk::CompositeAlphaFlagsKHR::OPAQUE) || supported.is_empty() {
        return vk::CompositeAlphaFlagsKHR::OPAQUE;
    }
    let raw = supported.as_raw();
    vk::CompositeAlphaFlagsKHR::from_raw(raw & raw.wrapping_neg())
}

/// Mailbox if available, FIFO otherwise.
pub fn choose_present_mode(modes: &[PresentMode]) -> PresentMode {
    if modes.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    }
}

/// Instance extensions needed to create a surface for `window`.
pub fn required_extensions(window: &impl HasRawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let names = ash_window::enumerate_required_extensions(window.raw_display_handle()).map_err(
        |result| Error::Initialization {
            operation: Operation::EnumerateInstanceExtensions,
            result,
        },
    )?;

    // Names are static strings owned by `ash-window`.
    Ok(names
        .iter()
        .map(|&name| unsafe { CStr::from_ptr(name) })
        .collect())
}

/// Binds a window to the device context's ability to present.
pub struct Surface {
    loader: khr::Surface,
    handle: vk::SurfaceKHR,
    lifeline: Lifeline,
    _device: Option<Tether>,
}

impl Surface {
    /// Creates a surface for `window`.
    ///
    /// The top-level handle must exist and must have been created with
    /// the extensions from [`required_extensions`].
    pub fn new<W>(device: &DeviceContext, window: &W) -> Result<Self>
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let instance = device.instance(Operation::CreateSurface)?;
        let loader = device.surface_loader(Operation::CreateSurface)?.clone();

        let tether = device.tether().ok_or(Error::OutOfOrder {
            operation: Operation::CreateSurface,
            state: device.state(),
        })?;

        let handle = unsafe {
            ash_window::create_surface(
                device.entry(),
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(|result| Error::SurfaceCreation {
            operation: Operation::CreateSurface,
            result,
        })?;

        tracing::trace!("created surface {:?}", handle);

        Ok(Surface {
            loader,
            handle,
            lifeline: Lifeline::new("surface"),
            _device: Some(tether),
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Registers a dependent that must be destroyed before this surface.
    pub fn tether(&self) -> Option<Tether> {
        self.lifeline.tether()
    }

    /// Queries capabilities, formats and present modes on the device's adapter.
    pub fn support(&self, device: &DeviceContext) -> Result<SurfaceSupport> {
        let adapter = device.adapter_handle(Operation::QuerySurfaceCapabilities)?;

        let error = |operation: Operation| {
            move |result: vk::Result| Error::SurfaceCreation { operation, result }
        };

        let capabilities = probe::query_surface_capabilities(&self.loader, adapter, self.handle)
            .map_err(error(Operation::QuerySurfaceCapabilities))?;
        let formats = probe::query_surface_formats(&self.loader, adapter, self.handle)
            .map_err(error(Operation::QuerySurfaceFormats))?;
        let present_modes = probe::query_present_modes(&self.loader, adapter, self.handle)
            .map_err(error(Operation::QueryPresentModes))?;

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Destroys the surface. Refuses while a swap chain still uses it.
    pub fn destroy(&mut self) -> Result<(), StillReferenced> {
        if self.handle == vk::SurfaceKHR::null() {
            return Ok(());
        }

        self.lifeline.release()?;

        unsafe { self.loader.destroy_surface(self.handle, None) };
        tracing::trace!("destroyed surface {:?}", self.handle);

        self.handle = vk::SurfaceKHR::null();
        self._device = None;
        Ok(())
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::error!("leaking surface: {err}");
        }
    }
}
