//! Raw capability queries.
//!
//! Every function here only reads driver state. Results are returned
//! as-is, empty lists included, and errors are plain [`vk::Result`]s
//! so callers can attach the operation they were performing.

use std::ffi::CStr;

use ash::{extensions::khr, prelude::VkResult, vk};
use hashbrown::HashSet;

use crate::{
    from::{AshInto, TryAshInto},
    queue::QueueFamilyInfo,
    surface::{PresentMode, SurfaceCapabilities, SurfaceFormat},
};

/// Converts a fixed-size driver name into an owned string.
pub(crate) fn name_to_string(name: &[std::os::raw::c_char]) -> String {
    // Driver guarantees the array is nul-terminated.
    unsafe { CStr::from_ptr(name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Names of all instance layers known to the loader.
pub fn list_validation_layers(entry: &ash::Entry) -> VkResult<HashSet<String>> {
    let layers = entry.enumerate_instance_layer_properties()?;
    Ok(layers
        .iter()
        .map(|layer| name_to_string(&layer.layer_name))
        .collect())
}

/// Names of all instance extensions known to the loader.
pub fn list_instance_extensions(entry: &ash::Entry) -> VkResult<HashSet<String>> {
    let extensions = entry.enumerate_instance_extension_properties(None)?;
    Ok(extensions
        .iter()
        .map(|extension| name_to_string(&extension.extension_name))
        .collect())
}

/// Names of all extensions the adapter exposes.
pub fn list_device_extensions(
    instance: &ash::Instance,
    adapter: vk::PhysicalDevice,
) -> VkResult<HashSet<String>> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(adapter) }?;
    Ok(extensions
        .iter()
        .map(|extension| name_to_string(&extension.extension_name))
        .collect())
}

/// Returns `true` if every required name is present in `available`.
///
/// Names are compared exactly. Order and repeated required names do not matter.
pub fn has_all<'a, I>(required: I, available: &HashSet<String>) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    required.into_iter().all(|name| available.contains(name))
}

/// Required names absent from `available`, in the order they were requested.
pub fn missing<'a, I>(required: I, available: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut missing = Vec::new();
    for name in required {
        if !available.contains(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_owned());
        }
    }
    missing
}

pub fn query_surface_capabilities(
    loader: &khr::Surface,
    adapter: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<SurfaceCapabilities> {
    let caps = unsafe { loader.get_physical_device_surface_capabilities(adapter, surface) }?;
    Ok(caps.ash_into())
}

pub fn query_surface_formats(
    loader: &khr::Surface,
    adapter: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<Vec<SurfaceFormat>> {
    let formats = unsafe { loader.get_physical_device_surface_formats(adapter, surface) }?;
    Ok(formats.into_iter().map(AshInto::ash_into).collect())
}

/// Present modes in driver order. Modes this crate does not model are skipped.
pub fn query_present_modes(
    loader: &khr::Surface,
    adapter: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<Vec<PresentMode>> {
    let modes = unsafe { loader.get_physical_device_surface_present_modes(adapter, surface) }?;
    Ok(modes
        .into_iter()
        .filter_map(|mode| {
            let known = mode.try_ash_into();
            if known.is_none() {
                tracing::trace!("skipping unknown present mode {:?}", mode);
            }
            known
        })
        .collect())
}

/// Per-family role support, indexed by family position.
///
/// Present support is asked from the surface for each family.
pub fn query_queue_families(
    instance: &ash::Instance,
    loader: &khr::Surface,
    adapter: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<Vec<QueueFamilyInfo>> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(adapter) };

    families
        .iter()
        .zip(0u32..)
        .map(|(family, index)| {
            let supports_present = unsafe {
                loader.get_physical_device_surface_support(adapter, index, surface)
            }?;

            Ok(QueueFamilyInfo {
                index,
                queue_count: family.queue_count,
                supports_graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                supports_present,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|&name| name.to_owned()).collect()
    }

    #[test]
    fn empty_requirement_always_satisfied() {
        let available = set(&["VK_LAYER_KHRONOS_validation"]);
        assert!(has_all([] as [&str; 0], &available));
        assert!(has_all(Vec::<&str>::new(), &set(&[])));
    }

    #[test]
    fn containment_is_exact() {
        let available = set(&["VK_KHR_swapchain", "VK_KHR_maintenance1"]);

        assert!(has_all(["VK_KHR_swapchain"], &available));
        assert!(has_all(["VK_KHR_maintenance1", "VK_KHR_swapchain"], &available));
        assert!(has_all(["VK_KHR_swapchain", "VK_KHR_swapchain"], &available));

        assert!(!has_all(["VK_KHR_swap"], &available));
        assert!(!has_all(["vk_khr_swapchain"], &available));
        assert!(!has_all(["VK_KHR_swapchain", "VK_EXT_mesh_shader"], &available));
    }

    #[test]
    fn random_subsets_are_contained() {
        use rand::{seq::SliceRandom, Rng};

        let names: Vec<String> = (0..32).map(|idx| format!("VK_ext_{idx}")).collect();
        let available: HashSet<String> = names.iter().cloned().collect();
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let count = rng.gen_range(0..names.len());
            let required: Vec<&str> = names
                .choose_multiple(&mut rng, count)
                .map(String::as_str)
                .collect();
            assert!(has_all(required.iter().copied(), &available));

            let mut with_foreign = required.clone();
            with_foreign.push("VK_not_there");
            with_foreign.shuffle(&mut rng);
            assert!(!has_all(with_foreign.iter().copied(), &available));
        }
    }

    #[test]
    fn missing_lists_each_name_once() {
        let available = set(&["a"]);
        assert_eq!(missing(["b", "a", "c", "b"], &available), ["b", "c"]);
        assert!(missing(["a"], &available).is_empty());
    }

    #[test]
    fn driver_names_are_read_up_to_nul() {
        let mut raw = [0 as std::os::raw::c_char; vk::MAX_EXTENSION_NAME_SIZE];
        for (dst, &src) in raw.iter_mut().zip(b"VK_KHR_swapchain") {
            *dst = src as std::os::raw::c_char;
        }
        assert_eq!(name_to_string(&raw), "VK_KHR_swapchain");
    }
}
