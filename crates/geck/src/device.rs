use std::ffi::{c_void, CStr, CString};

use ash::{
    extensions::{ext::DebugUtils, khr},
    prelude::VkResult,
    vk,
};

use crate::{
    adapter::{query_adapter, select_adapter, AdapterDescriptor},
    config::ContextConfig,
    error::{Error, Operation, Result, StillReferenced},
    lifeline::{Lifeline, Tether},
    probe,
    queue::{queue_create_infos, select_queue_families, QueueFamilies},
    surface::Surface,
};

const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"geck\0") };

/// Construction progress of a [`DeviceContext`].
///
/// Steps only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceState {
    Uninitialized,
    InstanceCreated,
    AdapterChosen,
    QueueFamiliesResolved,
    LogicalDeviceCreated,
    Ready,
    Destroyed,
}

/// Queue handles retrieved for each role.
///
/// Both may be the same queue when the families are shared,
/// in which case submissions and presentation must be ordered by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Queues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

struct DebugMessenger {
    loader: DebugUtils,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Owns the top-level handle, the chosen adapter, the logical device and its queues.
pub struct DeviceContext {
    config: ContextConfig,
    state: DeviceState,
    lifeline: Lifeline,
    validation: bool,
    enabled_layers: Vec<CString>,

    entry: ash::Entry,
    instance: Option<ash::Instance>,
    debug: Option<DebugMessenger>,
    surface_loader: Option<khr::Surface>,

    adapter: Option<AdapterDescriptor>,
    families: Option<QueueFamilies>,

    device: Option<ash::Device>,
    swapchain_loader: Option<khr::Swapchain>,
    queues: Option<Queues>,
}

impl DeviceContext {
    /// Loads the Vulkan runtime. No handles are created yet.
    pub fn new(config: ContextConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(Error::Loading)?;

        Ok(DeviceContext {
            config,
            state: DeviceState::Uninitialized,
            lifeline: Lifeline::new("device context"),
            validation: false,
            enabled_layers: Vec::new(),
            entry,
            instance: None,
            debug: None,
            surface_loader: None,
            adapter: None,
            families: None,
            device: None,
            swapchain_loader: None,
            queues: None,
        })
    }

    fn expect_state(&self, expected: DeviceState, operation: Operation) -> Result<()> {
        if self.state != expected {
            return Err(Error::OutOfOrder {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Creates the instance with the given extensions enabled.
    ///
    /// With `enable_validation` every configured validation layer must be
    /// available, otherwise [`Error::ValidationLayersUnavailable`] is returned.
    pub fn create_top_level_handle(
        &mut self,
        required_extensions: &[&CStr],
        enable_validation: bool,
    ) -> Result<()> {
        self.expect_state(DeviceState::Uninitialized, Operation::CreateInstance)?;

        let initialization = |operation: Operation| {
            move |result: vk::Result| Error::Initialization { operation, result }
        };

        if enable_validation {
            let available = probe::list_validation_layers(&self.entry)
                .map_err(initialization(Operation::EnumerateLayers))?;

            let required = self.config.validation_layers.iter().map(String::as_str);
            let missing = probe::missing(required, &available);
            if !missing.is_empty() {
                return Err(Error::ValidationLayersUnavailable { missing });
            }

            self.enabled_layers = self
                .config
                .validation_layers
                .iter()
                .map(|name| {
                    CString::new(name.as_str()).map_err(|_| Error::ValidationLayersUnavailable {
                        missing: vec![name.clone()],
                    })
                })
                .collect::<Result<_>>()?;
        }

        let mut extensions: Vec<*const std::os::raw::c_char> =
            required_extensions.iter().map(|name| name.as_ptr()).collect();

        let mut debug_utils = false;
        if enable_validation {
            let available = probe::list_instance_extensions(&self.entry)
                .map_err(initialization(Operation::EnumerateInstanceExtensions))?;

            let name = DebugUtils::name();
            if available.contains(name.to_string_lossy().as_ref()) {
                extensions.push(name.as_ptr());
                debug_utils = true;
            } else {
                tracing::warn!("{:?} is not available, driver messages are not logged", name);
            }
        }

        let layers: Vec<_> = self.enabled_layers.iter().map(|name| name.as_ptr()).collect();

        let api_version = self
            .entry
            .try_enumerate_instance_version()
            .ok()
            .flatten()
            .unwrap_or(vk::API_VERSION_1_0);

        let application_name = CString::new(self.config.application_name.as_str())
            .unwrap_or_else(|_| CString::from(ENGINE_NAME));

        let application_info = vk::ApplicationInfo::builder()
            .application_name(&application_name)
            .application_version(0)
            .engine_name(ENGINE_NAME)
            .engine_version(engine_version())
            .api_version(api_version);

        let mut messenger_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);

        if debug_utils {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { self.entry.create_instance(&create_info, None) }
            .map_err(initialization(Operation::CreateInstance))?;

        tracing::trace!(
            "created instance, api version {}",
            crate::adapter::Version::from_packed(api_version)
        );

        self.validation = enable_validation;
        self.surface_loader = Some(khr::Surface::new(&self.entry, &instance));

        let instance = self.instance.insert(instance);
        self.state = DeviceState::InstanceCreated;

        if debug_utils {
            let loader = DebugUtils::new(&self.entry, instance);
            let handle =
                unsafe { loader.create_debug_utils_messenger(&debug_messenger_info(), None) }
                    .map_err(initialization(Operation::CreateDebugMessenger))?;

            tracing::trace!("created debug messenger");
            self.debug = Some(DebugMessenger { loader, handle });
        }

        Ok(())
    }

    /// Describes every adapter visible to the instance, in enumeration order.
    pub fn enumerate_adapters(&self) -> Result<Vec<AdapterDescriptor>> {
        let instance = self.instance(Operation::EnumerateAdapters)?;

        let handles = unsafe { instance.enumerate_physical_devices() }.map_err(|result| {
            Error::Initialization {
                operation: Operation::EnumerateAdapters,
                result,
            }
        })?;

        handles
            .into_iter()
            .map(|handle| {
                query_adapter(instance, handle).map_err(|result| Error::Initialization {
                    operation: Operation::EnumerateDeviceExtensions,
                    result,
                })
            })
            .collect()
    }

    /// Chooses the adapter to create the logical device on.
    pub fn choose_adapter(&mut self) -> Result<&AdapterDescriptor> {
        self.expect_state(DeviceState::InstanceCreated, Operation::ChooseAdapter)?;

        let candidates = self.enumerate_adapters()?;
        let required: Vec<&str> = self
            .config
            .device_extensions
            .iter()
            .map(String::as_str)
            .collect();

        let chosen = select_adapter(&candidates, &required)
            .cloned()
            .ok_or(Error::NoSuitableAdapter {
                candidates: candidates.len(),
            })?;

        tracing::info!(
            "using adapter '{}' ({:?}, Vulkan {})",
            chosen.name,
            chosen.kind,
            chosen.api_version
        );

        self.state = DeviceState::AdapterChosen;
        Ok(self.adapter.insert(chosen))
    }

    /// Picks graphics and present families able to serve `surface`.
    pub fn resolve_queue_families(&mut self, surface: &Surface) -> Result<QueueFamilies> {
        self.expect_state(DeviceState::AdapterChosen, Operation::ResolveQueueFamilies)?;

        let (instance, loader, adapter) =
            match (&self.instance, &self.surface_loader, &self.adapter) {
                (Some(instance), Some(loader), Some(adapter)) => (instance, loader, adapter),
                _ => {
                    return Err(Error::OutOfOrder {
                        operation: Operation::ResolveQueueFamilies,
                        state: self.state,
                    })
                }
            };

        let infos = probe::query_queue_families(instance, loader, adapter.handle, surface.handle())
            .map_err(|result| Error::Initialization {
                operation: Operation::QueryQueueFamilies,
                result,
            })?;

        let families = select_queue_families(&infos).resolved()?;

        tracing::debug!(
            "queue families: graphics {}, present {}",
            families.graphics,
            families.present
        );

        self.families = Some(families);
        self.state = DeviceState::QueueFamiliesResolved;
        Ok(families)
    }

    /// Creates the logical device with one queue per distinct family
    /// and retrieves the queue for each role.
    pub fn create_logical_device(&mut self) -> Result<()> {
        self.expect_state(DeviceState::QueueFamiliesResolved, Operation::CreateDevice)?;

        let (instance, adapter, families) = match (&self.instance, &self.adapter, self.families) {
            (Some(instance), Some(adapter), Some(families)) => (instance, adapter, families),
            _ => {
                return Err(Error::OutOfOrder {
                    operation: Operation::CreateDevice,
                    state: self.state,
                })
            }
        };

        let queue_infos = queue_create_infos(&families);

        let extensions = device_extension_names(&self.config.device_extensions)?;
        let extensions: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();

        let layers: Vec<_> = if self.validation {
            self.enabled_layers.iter().map(|name| name.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(adapter.handle, &create_info, None) }
            .map_err(|result| Error::DeviceCreation {
                operation: Operation::CreateDevice,
                result,
            })?;

        tracing::trace!("created logical device with {} queue(s)", queue_infos.len());

        self.swapchain_loader = Some(khr::Swapchain::new(instance, &device));

        let queues = unsafe {
            Queues {
                graphics: device.get_device_queue(families.graphics, 0),
                present: device.get_device_queue(families.present, 0),
            }
        };

        self.device = Some(device);
        self.state = DeviceState::LogicalDeviceCreated;

        self.queues = Some(queues);
        self.state = DeviceState::Ready;
        Ok(())
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn adapter(&self) -> Option<&AdapterDescriptor> {
        self.adapter.as_ref()
    }

    pub fn queue_families(&self) -> Option<QueueFamilies> {
        self.families
    }

    pub fn queues(&self) -> Option<Queues> {
        self.queues
    }

    /// Logical device. Available once the context is [`DeviceState::Ready`].
    pub fn logical(&self) -> Result<&ash::Device> {
        match (&self.device, self.state) {
            (Some(device), DeviceState::Ready) => Ok(device),
            _ => Err(Error::OutOfOrder {
                operation: Operation::AccessDevice,
                state: self.state,
            }),
        }
    }

    /// Blocks until the device finished all submitted work.
    /// Does nothing before a device exists.
    pub fn wait_idle(&self) -> VkResult<()> {
        match &self.device {
            Some(device) => unsafe { device.device_wait_idle() },
            None => Ok(()),
        }
    }

    /// Registers a dependent that must be destroyed before this context.
    pub fn tether(&self) -> Option<Tether> {
        self.lifeline.tether()
    }

    /// Number of live dependents.
    pub fn dependents(&self) -> usize {
        self.lifeline.dependents()
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub(crate) fn instance(&self, operation: Operation) -> Result<&ash::Instance> {
        match &self.instance {
            Some(instance) if self.state != DeviceState::Destroyed => Ok(instance),
            _ => Err(Error::OutOfOrder {
                operation,
                state: self.state,
            }),
        }
    }

    pub(crate) fn surface_loader(&self, operation: Operation) -> Result<&khr::Surface> {
        self.surface_loader.as_ref().ok_or(Error::OutOfOrder {
            operation,
            state: self.state,
        })
    }

    pub(crate) fn swapchain_loader(&self, operation: Operation) -> Result<&khr::Swapchain> {
        match (&self.swapchain_loader, self.state) {
            (Some(loader), DeviceState::Ready) => Ok(loader),
            _ => Err(Error::OutOfOrder {
                operation,
                state: self.state,
            }),
        }
    }

    pub(crate) fn adapter_handle(&self, operation: Operation) -> Result<vk::PhysicalDevice> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter.handle)
            .ok_or(Error::OutOfOrder {
                operation,
                state: self.state,
            })
    }

    /// Destroys the logical device, the debug messenger and the instance,
    /// whichever were created.
    ///
    /// Refuses while any dependent is alive. Calling it again is a no-op.
    pub fn destroy(&mut self) -> Result<(), StillReferenced> {
        if self.state == DeviceState::Destroyed {
            return Ok(());
        }

        self.lifeline.release()?;

        self.queues = None;
        self.swapchain_loader = None;

        if let Some(device) = self.device.take() {
            unsafe {
                // Device is going away regardless of the outcome.
                let _ = device.device_wait_idle();
                device.destroy_device(None);
            }
            tracing::trace!("destroyed logical device");
        }

        if let Some(debug) = self.debug.take() {
            unsafe { debug.loader.destroy_debug_utils_messenger(debug.handle, None) };
            tracing::trace!("destroyed debug messenger");
        }

        self.surface_loader = None;

        if let Some(instance) = self.instance.take() {
            unsafe { instance.destroy_instance(None) };
            tracing::trace!("destroyed instance");
        }

        self.state = DeviceState::Destroyed;
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::error!("leaking Vulkan device: {err}");
        }
    }
}

fn engine_version() -> u32 {
    let major = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
    let minor = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);
    let patch = env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0);
    vk::make_api_version(0, major, minor, patch)
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
        .build()
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if !p_callback_data.is_null() {
        unsafe { vulkan_debug_callback_impl(message_severity, message_types, &*p_callback_data) };
    }
    vk::FALSE
}

unsafe fn lossy_str<'a>(ptr: *const std::os::raw::c_char) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        "".into()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

unsafe fn vulkan_debug_callback_impl(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: &vk::DebugUtilsMessengerCallbackDataEXT,
) {
    let message_id_name = unsafe { lossy_str(data.p_message_id_name) };
    let message_id_number = data.message_id_number;
    let message = unsafe { lossy_str(data.p_message) };

    let objects = (0..data.object_count as usize)
        .map(|idx| unsafe { &*data.p_objects.add(idx) })
        .map(|object| {
            (
                object.object_type,
                object.object_handle,
                unsafe { lossy_str(object.p_object_name) }.into_owned(),
            )
        })
        .collect::<Vec<_>>();

    macro_rules! emit {
        ($level:expr) => {
            tracing::event!(
                target: "vulkan",
                $level,
                message_id_name = %message_id_name,
                message_id_number,
                message_types = ?message_types,
                objects = ?objects,
                "{}",
                message,
            )
        };
    }

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => emit!(tracing::Level::ERROR),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => emit!(tracing::Level::WARN),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => emit!(tracing::Level::INFO),
        _ => emit!(tracing::Level::TRACE),
    }
}

/// Device extension names as C strings. A name with an interior NUL can never be enabled.
fn device_extension_names(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| {
                tracing::error!("device extension name {name:?} contains NUL");
                Error::DeviceCreation {
                    operation: Operation::CreateDevice,
                    result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_name_with_nul_is_rejected() {
        let names = vec!["VK_KHR_swapchain".to_owned(), "VK_KHR\0bogus".to_owned()];
        assert!(matches!(
            device_extension_names(&names),
            Err(Error::DeviceCreation {
                operation: Operation::CreateDevice,
                result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            })
        ));

        let names = &names[..1];
        let converted = device_extension_names(names).unwrap();
        assert_eq!(converted[0].to_str().unwrap(), "VK_KHR_swapchain");
    }

    #[test]
    fn states_only_move_forward() {
        use DeviceState::*;

        let order = [
            Uninitialized,
            InstanceCreated,
            AdapterChosen,
            QueueFamiliesResolved,
            LogicalDeviceCreated,
            Ready,
            Destroyed,
        ];
        assert!(order.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn engine_name_is_nul_terminated() {
        assert_eq!(ENGINE_NAME.to_str().unwrap(), "geck");
    }

    #[test]
    fn messenger_listens_to_all_severities() {
        let info = debug_messenger_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info.pfn_user_callback.is_some());
    }
}
