use serde::Deserialize;

/// Settings consumed while building the device context.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Reported to the driver as the application name.
    pub application_name: String,

    /// Enables validation layers and the debug messenger.
    /// Initialization fails if any requested layer is missing.
    pub validation: bool,

    pub validation_layers: Vec<String>,

    /// Extensions every candidate adapter must expose.
    pub device_extensions: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            application_name: "geck".to_owned(),
            validation: cfg!(debug_assertions),
            validation_layers: vec!["VK_LAYER_KHRONOS_validation".to_owned()],
            device_extensions: vec!["VK_KHR_swapchain".to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ContextConfig = toml::from_str(
            r#"
            application_name = "rects"
            validation = false
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "rects");
        assert!(!config.validation);
        assert_eq!(
            config.validation_layers,
            ContextConfig::default().validation_layers
        );
        assert_eq!(config.device_extensions, ["VK_KHR_swapchain"]);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: ContextConfig = toml::from_str("").unwrap();
        assert_eq!(config, ContextConfig::default());
    }
}
