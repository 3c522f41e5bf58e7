use std::fmt;

use ash::{prelude::VkResult, vk};
use hashbrown::HashSet;

use crate::{from::AshInto, probe};

/// Kind of a physical GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn from_packed(version: u32) -> Self {
        Version {
            major: vk::api_version_major(version),
            minor: vk::api_version_minor(version),
            patch: vk::api_version_patch(version),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Physical GPU together with everything queried about it.
#[derive(Clone, Debug)]
pub struct AdapterDescriptor {
    pub(crate) handle: vk::PhysicalDevice,
    pub name: String,
    pub kind: AdapterKind,
    pub api_version: Version,
    pub geometry_shader: bool,
    pub extensions: HashSet<String>,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl AdapterDescriptor {
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Discrete GPU with geometry shader support.
    pub fn is_preferred(&self) -> bool {
        self.kind == AdapterKind::Discrete && self.geometry_shader
    }
}

/// Queries properties, features, extensions and queue families of an adapter.
pub fn query_adapter(
    instance: &ash::Instance,
    adapter: vk::PhysicalDevice,
) -> VkResult<AdapterDescriptor> {
    let properties = unsafe { instance.get_physical_device_properties(adapter) };
    let features = unsafe { instance.get_physical_device_features(adapter) };
    let extensions = probe::list_device_extensions(instance, adapter)?;
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(adapter) };

    Ok(AdapterDescriptor {
        handle: adapter,
        name: probe::name_to_string(&properties.device_name),
        kind: properties.device_type.ash_into(),
        api_version: Version::from_packed(properties.api_version),
        geometry_shader: features.geometry_shader != vk::FALSE,
        extensions,
        queue_families,
    })
}

/// Chooses an adapter among `candidates`.
///
/// Candidates lacking any of `required` extensions are dropped.
/// Among the rest a discrete GPU with geometry shaders is preferred,
/// otherwise the first survivor in enumeration order is taken.
pub fn select_adapter<'a>(
    candidates: &'a [AdapterDescriptor],
    required: &[&str],
) -> Option<&'a AdapterDescriptor> {
    let mut suitable = candidates
        .iter()
        .filter(|adapter| probe::has_all(required.iter().copied(), &adapter.extensions));

    let first = suitable.clone().next()?;

    match suitable.find(|adapter| adapter.is_preferred()) {
        Some(preferred) => Some(preferred),
        None => {
            tracing::warn!(
                "no discrete GPU with geometry shaders, falling back to '{}' ({:?})",
                first.name,
                first.kind
            );
            Some(first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(
        name: &str,
        kind: AdapterKind,
        geometry_shader: bool,
        extensions: &[&str],
    ) -> AdapterDescriptor {
        AdapterDescriptor {
            handle: vk::PhysicalDevice::null(),
            name: name.to_owned(),
            kind,
            api_version: Version {
                major: 1,
                minor: 2,
                patch: 0,
            },
            geometry_shader,
            extensions: extensions.iter().map(|&name| name.to_owned()).collect(),
            queue_families: Vec::new(),
        }
    }

    const SWAPCHAIN: &[&str] = &["VK_KHR_swapchain"];

    #[test]
    fn prefers_discrete_with_geometry() {
        let candidates = [
            adapter("igpu", AdapterKind::Integrated, true, SWAPCHAIN),
            adapter("dgpu", AdapterKind::Discrete, true, SWAPCHAIN),
        ];
        let chosen = select_adapter(&candidates, SWAPCHAIN).unwrap();
        assert_eq!(chosen.name, "dgpu");
    }

    #[test]
    fn falls_back_to_first_suitable() {
        let candidates = [
            adapter("no-swapchain", AdapterKind::Discrete, true, &[]),
            adapter("cpu", AdapterKind::Cpu, false, SWAPCHAIN),
            adapter("dgpu-no-geometry", AdapterKind::Discrete, false, SWAPCHAIN),
        ];
        let chosen = select_adapter(&candidates, SWAPCHAIN).unwrap();
        assert_eq!(chosen.name, "cpu");
    }

    #[test]
    fn extension_filter_applies_before_preference() {
        let candidates = [
            adapter("dgpu", AdapterKind::Discrete, true, &[]),
            adapter("igpu", AdapterKind::Integrated, false, SWAPCHAIN),
        ];
        let chosen = select_adapter(&candidates, SWAPCHAIN).unwrap();
        assert_eq!(chosen.name, "igpu");
    }

    #[test]
    fn nothing_suitable() {
        let candidates = [adapter("dgpu", AdapterKind::Discrete, true, &[])];
        assert!(select_adapter(&candidates, SWAPCHAIN).is_none());
        assert!(select_adapter(&[], SWAPCHAIN).is_none());
    }

    #[test]
    fn version_display() {
        let version = Version::from_packed(vk::make_api_version(0, 1, 3, 250));
        assert_eq!(version.to_string(), "1.3.250");
    }
}
