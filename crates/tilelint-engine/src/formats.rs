// SPDX-License-Identifier: CEPL-1.0
use std::collections::HashMap;

use ash::vk;

/// Block-compressed formats: BC, ETC2/EAC, ASTC LDR, PVRTC and ASTC HDR.
pub fn is_compressed_format(format: vk::Format) -> bool {
    matches!(
        format.as_raw(),
        131..=184 | 1_000_054_000..=1_000_054_007 | 1_000_066_000..=1_000_066_013
    )
}

pub fn has_depth(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Which (format, sample count) pairs get framebuffer compression.
///
/// This is hardware policy, not something derivable from the API, so it is
/// data: the default table describes a PowerVR-class GPU and embedders can
/// swap in their own.
#[derive(Clone, Debug)]
pub struct FbcdcTable {
    supported: HashMap<vk::Format, vk::SampleCountFlags>,
}

impl FbcdcTable {
    pub fn empty() -> Self {
        FbcdcTable {
            supported: HashMap::new(),
        }
    }

    /// Marks `format` compressible at every sample count in `samples`.
    pub fn with(mut self, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        *self.supported.entry(format).or_default() |= samples;
        self
    }

    pub fn supports(&self, format: vk::Format, samples: vk::SampleCountFlags) -> bool {
        self.supported
            .get(&format)
            .is_some_and(|mask| mask.contains(samples))
    }
}

impl Default for FbcdcTable {
    fn default() -> Self {
        // Single-sampled targets of up to 64bpp; no 16-bit depth.
        [
            vk::Format::R8_UNORM,
            vk::Format::R8G8_UNORM,
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::R8G8B8A8_SRGB,
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::R5G6B5_UNORM_PACK16,
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::Format::A2R10G10B10_UNORM_PACK32,
            vk::Format::B10G11R11_UFLOAT_PACK32,
            vk::Format::R16_SFLOAT,
            vk::Format::R16G16_SFLOAT,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::R32_SFLOAT,
            vk::Format::D32_SFLOAT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::X8_D24_UNORM_PACK32,
        ]
        .into_iter()
        .fold(FbcdcTable::empty(), |table, format| {
            table.with(format, vk::SampleCountFlags::TYPE_1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_ranges() {
        assert!(is_compressed_format(vk::Format::BC1_RGB_UNORM_BLOCK));
        assert!(is_compressed_format(vk::Format::ETC2_R8G8B8A8_SRGB_BLOCK));
        assert!(is_compressed_format(vk::Format::ASTC_12X12_SRGB_BLOCK));
        assert!(is_compressed_format(vk::Format::PVRTC1_4BPP_UNORM_BLOCK_IMG));
        assert!(is_compressed_format(vk::Format::ASTC_4X4_SFLOAT_BLOCK));
        assert!(!is_compressed_format(vk::Format::R8G8B8A8_UNORM));
        assert!(!is_compressed_format(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!is_compressed_format(vk::Format::G8B8G8R8_422_UNORM));
    }

    #[test]
    fn depth_stencil_aspects() {
        assert!(has_depth(vk::Format::D16_UNORM) && !has_stencil(vk::Format::D16_UNORM));
        assert!(has_stencil(vk::Format::S8_UINT) && !has_depth(vk::Format::S8_UINT));
        let packed = vk::Format::D24_UNORM_S8_UINT;
        assert!(has_depth(packed) && has_stencil(packed));
        assert!(!has_depth(vk::Format::R8G8B8A8_UNORM));
    }

    #[test]
    fn default_fbcdc_policy() {
        let table = FbcdcTable::default();
        assert!(table.supports(vk::Format::D32_SFLOAT, vk::SampleCountFlags::TYPE_1));
        assert!(!table.supports(vk::Format::D16_UNORM, vk::SampleCountFlags::TYPE_1));
        assert!(table.supports(vk::Format::R16_SFLOAT, vk::SampleCountFlags::TYPE_1));
        assert!(!table.supports(vk::Format::R16_SFLOAT, vk::SampleCountFlags::TYPE_4));
    }

    #[test]
    fn custom_fbcdc_policy() {
        let table = FbcdcTable::empty().with(
            vk::Format::R8G8B8A8_UNORM,
            vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
        );
        assert!(table.supports(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_4));
        assert!(!table.supports(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_2));
        assert!(!table.supports(vk::Format::R8_UNORM, vk::SampleCountFlags::TYPE_1));
    }
}
