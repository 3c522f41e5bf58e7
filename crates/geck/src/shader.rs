use std::{borrow::Cow, fmt, path::Path};

use ash::vk;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{self, termcolor::Buffer},
};

use crate::{
    device::DeviceContext,
    error::{Error, Operation, Result, ShaderError},
    fs,
    lifeline::Tether,
};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Conventional entry point name of every shader stage.
pub(crate) const ENTRY_POINT_NAME: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

impl ShaderStage {
    fn naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderLanguage {
    SpirV,
    Wgsl,
}

impl ShaderLanguage {
    /// `.wgsl` files are WGSL, everything else is treated as SPIR-V.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wgsl") => ShaderLanguage::Wgsl,
            _ => ShaderLanguage::SpirV,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ShaderSource<'a> {
    pub code: Cow<'a, [u8]>,
    /// Used in diagnostics and debug names.
    pub filename: Option<Cow<'a, str>>,
    pub language: ShaderLanguage,
}

impl<'a> ShaderSource<'a> {
    pub fn spirv(code: impl Into<Cow<'a, [u8]>>) -> Self {
        ShaderSource {
            code: code.into(),
            filename: None,
            language: ShaderLanguage::SpirV,
        }
    }

    pub fn wgsl(code: impl Into<Cow<'a, str>>) -> Self {
        let code = match code.into() {
            Cow::Borrowed(code) => Cow::Borrowed(code.as_bytes()),
            Cow::Owned(code) => Cow::Owned(code.into_bytes()),
        };

        ShaderSource {
            code,
            filename: None,
            language: ShaderLanguage::Wgsl,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<Cow<'a, str>>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Reads a shader file, choosing the language by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<ShaderSource<'static>, ShaderError> {
        let path = path.as_ref();
        let code = fs::read_binary(path).map_err(|err| ShaderError::Read {
            path: err.path,
            source: err.source,
        })?;

        Ok(ShaderSource {
            code: Cow::Owned(code),
            filename: Some(Cow::Owned(path.display().to_string())),
            language: ShaderLanguage::from_path(path),
        })
    }

    pub fn into_owned(self) -> ShaderSource<'static> {
        ShaderSource {
            code: Cow::Owned(self.code.into_owned()),
            filename: self.filename.map(|name| Cow::Owned(name.into_owned())),
            language: self.language,
        }
    }
}

/// Produces SPIR-V words for `stage` from the source.
///
/// SPIR-V is checked for size and magic number.
/// WGSL is parsed, validated and translated with `main` as the entry point.
pub(crate) fn compile(source: &ShaderSource, stage: ShaderStage) -> Result<Vec<u32>, ShaderError> {
    match source.language {
        ShaderLanguage::SpirV => read_spirv(&source.code),
        ShaderLanguage::Wgsl => {
            let code = std::str::from_utf8(&source.code)?;
            compile_wgsl(code, source.filename.as_deref(), stage)
        }
    }
}

fn read_spirv(code: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if code.len() % 4 != 0 {
        return Err(ShaderError::Misaligned(code.len()));
    }

    let words: Vec<u32> = code
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(ShaderError::BadMagic),
    }
}

fn compile_wgsl(
    code: &str,
    filename: Option<&str>,
    stage: ShaderStage,
) -> Result<Vec<u32>, ShaderError> {
    let module = naga::front::wgsl::parse_str(code).map_err(|err| {
        let rendered = err.emit_to_string(code);
        tracing::event!(target: "naga", tracing::Level::ERROR, diagnostic = %rendered);
        ShaderError::ParseWgsl(rendered)
    })?;

    let flags = naga::valid::ValidationFlags::all();
    let caps = naga::valid::Capabilities::PUSH_CONSTANT;
    let info = naga::valid::Validator::new(flags, caps)
        .validate(&module)
        .map_err(|err| {
            emit_annotated_error(&err, filename.map(|filename| (filename, code)));
            ShaderError::ValidationFailed(err.as_inner().to_string())
        })?;

    // Vertex output stays in Vulkan clip space, y pointing down.
    let options = naga::back::spv::Options {
        flags: naga::back::spv::WriterFlags::empty(),
        ..naga::back::spv::Options::default()
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage.naga(),
        entry_point: ENTRY_POINT_NAME.to_owned(),
    };

    let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))?;
    Ok(words)
}

fn emit_annotated_error<E: std::error::Error>(
    error: &naga::WithSpan<E>,
    file: Option<(&str, &str)>,
) {
    if let Some((filename, source)) = file {
        let files = SimpleFile::new(filename, source);
        let config = term::Config::default();
        let mut writer = Buffer::no_color();

        let diagnostic = Diagnostic::error().with_labels(
            error
                .spans()
                .filter_map(|(span, desc)| {
                    let range = span.to_range()?;
                    Some(Label::primary((), range).with_message(desc.to_owned()))
                })
                .collect(),
        );

        if term::emit(&mut writer, &config, &files, &diagnostic).is_ok() {
            if let Ok(s) = std::str::from_utf8(writer.as_slice()) {
                tracing::event!(
                    target: "naga",
                    tracing::Level::ERROR,
                    error = error.as_inner().to_string(),
                    diagnostic = s,
                );
                return;
            }
        }
    }

    tracing::event!(
        target: "naga",
        tracing::Level::ERROR,
        error = error.as_inner().to_string(),
    );
}

/// Compiled shader loaded into the device, tagged with its stage.
///
/// Pipelines only read modules while being built,
/// so modules may be destroyed right after.
pub struct ShaderModule {
    device: ash::Device,
    handle: vk::ShaderModule,
    stage: ShaderStage,
    name: String,
    _device: Option<Tether>,
}

impl ShaderModule {
    pub fn new(device: &DeviceContext, stage: ShaderStage, source: &ShaderSource) -> Result<Self> {
        let name = match &source.filename {
            Some(filename) => filename.to_string(),
            None => format!("<{stage} shader>"),
        };

        let shader_error = |source: ShaderError| Error::ShaderCreation {
            name: name.clone(),
            source,
        };

        let logical = device.logical()?;
        let tether = device.tether().ok_or(Error::OutOfOrder {
            operation: Operation::CreateShaderModule,
            state: device.state(),
        })?;

        let words = compile(source, stage).map_err(shader_error)?;

        let handle = unsafe {
            logical.create_shader_module(&vk::ShaderModuleCreateInfo::builder().code(&words), None)
        }
        .map_err(|result| shader_error(ShaderError::Vulkan(result)))?;

        tracing::trace!("created {stage} shader module '{name}'");

        Ok(ShaderModule {
            device: logical.clone(),
            handle,
            stage,
            name,
            _device: Some(tether),
        })
    }

    /// Loads a shader file. `.wgsl` files are translated, others are read as SPIR-V.
    pub fn from_file(
        device: &DeviceContext,
        stage: ShaderStage,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = ShaderSource::from_file(path).map_err(|source| Error::ShaderCreation {
            name: path.display().to_string(),
            source,
        })?;
        ShaderModule::new(device, stage, &source)
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    pub fn destroy(&mut self) {
        if self.handle == vk::ShaderModule::null() {
            return;
        }

        unsafe { self.device.destroy_shader_module(self.handle, None) };
        tracing::trace!("destroyed {} shader module '{}'", self.stage, self.name);

        self.handle = vk::ShaderModule::null();
        self._device = None;
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.destroy();
    }
}
