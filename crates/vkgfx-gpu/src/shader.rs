//! SPIR-V shader modules.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};
use std::io::Cursor;

/// Pipeline stage a module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderModuleType {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderModuleType {
    /// Native stage flag for this module type.
    pub const fn to_stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Guess the type from a file name such as `mesh.vert.spv`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".spv").unwrap_or(name);
        match stem.rsplit('.').next()? {
            "vert" => Some(Self::Vertex),
            "geom" => Some(Self::Geometry),
            "frag" => Some(Self::Fragment),
            _ => None,
        }
    }
}

/// Owned `VkShaderModule` with its stage and entry point.
pub struct ShaderModule {
    module: vk::ShaderModule,
    ty: ShaderModuleType,
    entry_point: CString,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        bytes: &[u8],
        ty: ShaderModuleType,
        entry_point: &str,
    ) -> Result<Self> {
        let code = parse_spirv(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| GpuError::InvalidShader(format!("entry point: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = device.create_shader_module(&create_info, None)?;

        Ok(Self {
            module,
            ty,
            entry_point,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn ty(&self) -> ShaderModuleType {
        self.ty
    }

    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description borrowing this module's entry point.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.ty.to_stage_flags())
            .module(self.module)
            .name(&self.entry_point)
    }

    /// # Safety
    /// The device must be valid. Pipelines already built from the module
    /// stay valid.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_shader_module(self.module, None);
    }
}

/// Decode little-endian SPIR-V words, checking the magic number.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(GpuError::InvalidShader("empty bytecode".to_string()));
    }

    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::InvalidShader(e.to_string()))?;

    if code.first() != Some(&SPIRV_MAGIC) {
        return Err(GpuError::InvalidShader("missing SPIR-V magic".to_string()));
    }

    Ok(code)
}

const SPIRV_MAGIC: u32 = 0x0723_0203;
