use std::path::{Path, PathBuf};

use geck::ContextConfig;
use miette::{Context as _, IntoDiagnostic as _};
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            title: "geck".to_owned(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Shader files, relative paths are resolved against the config file directory.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders");
        ShaderPaths {
            vertex: dir.join("rect.vert.wgsl"),
            fragment: dir.join("rect.frag.wgsl"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window: WindowConfig,
    pub target_fps: u32,
    pub context: ContextConfig,
    pub shaders: ShaderPaths,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig {
            window: WindowConfig::default(),
            target_fps: 60,
            context: ContextConfig::default(),
            shaders: ShaderPaths::default(),
        }
    }
}

impl DemoConfig {
    /// Loads config from `path`. Missing file yields defaults.
    pub fn load(path: &Path) -> miette::Result<Self> {
        if !path.exists() {
            tracing::info!("{} not found, using default config", path.display());
            return Ok(DemoConfig::default());
        }

        let text = geck::fs::read_text(path).into_diagnostic()?;
        let mut config = Self::parse(&text)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;

        if let Some(dir) = path.parent() {
            config.shaders.vertex = dir.join(&config.shaders.vertex);
            config.shaders.fragment = dir.join(&config.shaders.fragment);
        }
        Ok(config)
    }

    pub fn parse(text: &str) -> miette::Result<Self> {
        toml::from_str(text).into_diagnostic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let config = DemoConfig::parse(
            r#"
            target_fps = 30

            [window]
            title = "rects"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_fps, 30);
        assert_eq!(config.window.title, "rects");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.context, ContextConfig::default());
        assert_eq!(config.shaders, ShaderPaths::default());
    }

    #[test]
    fn context_section_reaches_device_config() {
        let config = DemoConfig::parse(
            r#"
            [context]
            validation = false
            device_extensions = ["VK_KHR_swapchain", "VK_KHR_maintenance1"]
            "#,
        )
        .unwrap();

        assert!(!config.context.validation);
        assert_eq!(config.context.device_extensions.len(), 2);
    }

    #[test]
    fn missing_file_is_default() {
        let config = DemoConfig::load(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("geck.toml");
        let config = DemoConfig::load(&path).unwrap();
        assert!(config.shaders.vertex.exists());
        assert!(config.shaders.fragment.exists());
    }

    #[test]
    fn default_shaders_exist() {
        let shaders = ShaderPaths::default();
        assert!(shaders.vertex.exists());
        assert!(shaders.fragment.exists());
    }
}
