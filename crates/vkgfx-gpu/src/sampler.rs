//! Texture samplers.

use crate::capabilities::GpuCapabilities;
use crate::error::Result;
use ash::vk;

/// Texel filter for magnification and minification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerFilter {
    Nearest,
    #[default]
    Linear,
}

impl SamplerFilter {
    pub const fn to_vk(self) -> vk::Filter {
        match self {
            Self::Nearest => vk::Filter::NEAREST,
            Self::Linear => vk::Filter::LINEAR,
        }
    }
}

/// Addressing outside the `[0, 1]` texture coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerWrapMode {
    #[default]
    Repeat,
    Mirror,
    ClampToEdge,
}

impl SamplerWrapMode {
    pub const fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
            Self::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub mag_filter: SamplerFilter,
    pub min_filter: SamplerFilter,
    pub wrap_u: SamplerWrapMode,
    pub wrap_v: SamplerWrapMode,
}

impl SamplerDesc {
    /// Same filter on both axes and the same wrap mode on both coordinates.
    pub const fn uniform(filter: SamplerFilter, wrap: SamplerWrapMode) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            wrap_u: wrap,
            wrap_v: wrap,
        }
    }

    fn create_info(&self, max_anisotropy: Option<f32>) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter.to_vk())
            .min_filter(self.min_filter.to_vk())
            .address_mode_u(self.wrap_u.to_vk())
            .address_mode_v(self.wrap_v.to_vk())
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy.is_some())
            .max_anisotropy(max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0)
    }
}

/// Owned `VkSampler`.
pub struct Sampler {
    sampler: vk::Sampler,
    desc: SamplerDesc,
}

/// Anisotropy requested when the device supports it.
const PREFERRED_ANISOTROPY: f32 = 16.0;

impl Sampler {
    /// Create a sampler. Anisotropic filtering is enabled when the device
    /// supports it, clamped to the device limit.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        capabilities: &GpuCapabilities,
        desc: SamplerDesc,
    ) -> Result<Self> {
        let anisotropy = capabilities
            .max_sampler_anisotropy
            .map(|max| max.min(PREFERRED_ANISOTROPY));

        let sampler = device.create_sampler(&desc.create_info(anisotropy), None)?;

        Ok(Self { sampler, desc })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    /// # Safety
    /// The device must be valid and the sampler must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_sampler(self.sampler, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_translation() {
        assert_eq!(SamplerFilter::Nearest.to_vk(), vk::Filter::NEAREST);
        assert_eq!(SamplerFilter::Linear.to_vk(), vk::Filter::LINEAR);
    }

    #[test]
    fn wrap_translation() {
        assert_eq!(
            SamplerWrapMode::Repeat.to_vk(),
            vk::SamplerAddressMode::REPEAT
        );
        assert_eq!(
            SamplerWrapMode::Mirror.to_vk(),
            vk::SamplerAddressMode::MIRRORED_REPEAT
        );
        assert_eq!(
            SamplerWrapMode::ClampToEdge.to_vk(),
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        );
    }

    #[test]
    fn create_info_reflects_desc() {
        let desc = SamplerDesc {
            mag_filter: SamplerFilter::Nearest,
            min_filter: SamplerFilter::Linear,
            wrap_u: SamplerWrapMode::ClampToEdge,
            wrap_v: SamplerWrapMode::Mirror,
        };

        let info = desc.create_info(None);
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::MIRRORED_REPEAT);
        assert_eq!(info.anisotropy_enable, vk::FALSE);

        let info = desc.create_info(Some(8.0));
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 8.0);
    }

    #[test]
    fn default_desc_is_linear_repeat() {
        assert_eq!(
            SamplerDesc::default(),
            SamplerDesc::uniform(SamplerFilter::Linear, SamplerWrapMode::Repeat)
        );
    }
}
