// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

#[derive(Debug, thiserror::Error)]
#[error("unknown message code {0}")]
pub struct UnknownMessageCode(pub u32);

macro_rules! message_codes {
    ($(
        $variant:ident = $raw:literal,
        $name:literal, $toggle:literal, $enabled:literal, $desc:literal;
    )*) => {
        /// Stable identity of every diagnostic the layer can raise.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u32)]
        pub enum MessageCode {
            $( $variant = $raw, )*
        }

        impl MessageCode {
            /// Every code, in ascending raw order.
            pub const ALL: &'static [MessageCode] = &[ $( MessageCode::$variant, )* ];

            pub const fn name(self) -> &'static str {
                match self {
                    $( MessageCode::$variant => $name, )*
                }
            }

            /// Name of the config option that switches this code on or off.
            pub const fn toggle_name(self) -> &'static str {
                match self {
                    $( MessageCode::$variant => $toggle, )*
                }
            }

            pub const fn enabled_by_default(self) -> bool {
                match self {
                    $( MessageCode::$variant => $enabled, )*
                }
            }

            pub const fn description(self) -> &'static str {
                match self {
                    $( MessageCode::$variant => $desc, )*
                }
            }
        }
    };
}

message_codes! {
    CommandBufferReset = 1, "COMMAND_BUFFER_RESET", "msgCommandBufferReset", true,
        "Command buffer reset individually instead of resetting its pool";
    CommandBufferSimultaneousUse = 2, "COMMAND_BUFFER_SIMULTANEOUS_USE",
        "msgCommandBufferSimultaneousUse", true,
        "Command buffer recorded with simultaneous use";
    SmallAllocation = 3, "SMALL_ALLOCATION", "msgSmallAllocation", true,
        "Device memory allocation smaller than the recommended size";
    SmallDedicatedAllocation = 4, "SMALL_DEDICATED_ALLOCATION", "msgSmallDedicatedAllocation", true,
        "Small resource consumes an entire device memory allocation";
    TooLargeSampleCount = 5, "TOO_LARGE_SAMPLE_COUNT", "msgTooLargeSampleCount", true,
        "Image sample count exceeds the full-throughput limit";
    NonLazyMultisampledImage = 6, "NON_LAZY_MULTISAMPLED_IMAGE", "msgNonLazyMultisampledImage",
        true,
        "Multisampled image not backed by lazily allocated memory";
    NonLazyTransientImage = 7, "NON_LAZY_TRANSIENT_IMAGE", "msgNonLazyTransientImage", true,
        "Transient image not backed by lazily allocated memory";
    MultisampledImageRequiresMemory = 8, "MULTISAMPLED_IMAGE_REQUIRES_MEMORY",
        "msgMultisampledImageRequiresMemory", true,
        "Multisampled image requires physical memory";
    ResolveImage = 9, "RESOLVE_IMAGE", "msgResolveImage", true,
        "vkCmdResolveImage used instead of render pass resolve attachments";
    FramebufferAttachmentShouldBeTransient = 10, "FRAMEBUFFER_ATTACHMENT_SHOULD_BE_TRANSIENT",
        "msgFramebufferAttachmentShouldBeTransient", true,
        "Attachment is never loaded or stored and should be transient";
    FramebufferAttachmentShouldNotBeTransient = 11,
        "FRAMEBUFFER_ATTACHMENT_SHOULD_NOT_BE_TRANSIENT",
        "msgFramebufferAttachmentShouldNotBeTransient", true,
        "Transient attachment is loaded or stored";
    IndexBufferSparse = 12, "INDEX_BUFFER_SPARSE", "msgIndexBufferSparse", true,
        "Index buffer references a sparse vertex range";
    IndexBufferCacheThrashing = 13, "INDEX_BUFFER_CACHE_THRASHING", "msgIndexBufferCacheThrashing",
        true,
        "Index buffer order thrashes the post-transform cache";
    TooManyInstancedVertexBuffers = 14, "TOO_MANY_INSTANCED_VERTEX_BUFFERS",
        "msgTooManyInstancedVertexBuffers", true,
        "Too many instanced vertex buffers bound";
    DissimilarWrapping = 15, "DISSIMILAR_WRAPPING", "msgDissimilarWrapping", false,
        "Sampler uses different wrapping modes per axis";
    NoPipelineCache = 16, "NO_PIPELINE_CACHE", "msgNoPipelineCache", true,
        "Pipeline created without a pipeline cache";
    DescriptorSetAllocationChecks = 17, "DESCRIPTOR_SET_ALLOCATION_CHECKS",
        "msgDescriptorSetAllocationChecks", true,
        "Descriptor sets allocated and freed in a hot path";
    ComputeNoThreadGroupAlignment = 18, "COMPUTE_NO_THREAD_GROUP_ALIGNMENT",
        "msgComputeNoThreadGroupAlignment", false,
        "Compute workgroup size is not aligned to the thread group size";
    ComputeLargeWorkGroup = 19, "COMPUTE_LARGE_WORK_GROUP", "msgComputeLargeWorkGroup", false,
        "Compute workgroup is larger than the efficient limit";
    ComputePoorSpatialLocality = 20, "COMPUTE_POOR_SPATIAL_LOCALITY",
        "msgComputePoorSpatialLocality", true,
        "Compute workgroup shape has poor spatial locality";
    PotentialPushConstant = 21, "POTENTIAL_PUSH_CONSTANT", "msgPotentialPushConstant", true,
        "Small uniform buffer could be a push constant";
    ManySmallIndexedDrawcalls = 22, "MANY_SMALL_INDEXED_DRAWCALLS", "msgManySmallIndexedDrawcalls",
        true,
        "Command buffer records many small indexed draw calls";
    DepthPrePass = 23, "DEPTH_PRE_PASS", "msgDepthPrePass", true,
        "Depth pre-pass detected";
    PipelineBubble = 24, "PIPELINE_BUBBLE", "msgPipelineBubble", true,
        "Barrier causes a pipeline bubble";
    NotFullThroughputBlending = 25, "NOT_FULL_THROUGHPUT_BLENDING", "msgNotFullThroughputBlending",
        false,
        "Blend state does not run at full throughput";
    SamplerLodClamping = 26, "SAMPLER_LOD_CLAMPING", "msgSamplerLodClamping", false,
        "Sampler clamps the LOD range";
    SamplerLodBias = 27, "SAMPLER_LOD_BIAS", "msgSamplerLodBias", false,
        "Sampler applies a LOD bias";
    SamplerBorderClampColor = 28, "SAMPLER_BORDER_CLAMP_COLOR", "msgSamplerBorderClampColor", false,
        "Sampler uses a border clamp color";
    SamplerUnnormalizedCoords = 29, "SAMPLER_UNNORMALIZED_COORDS", "msgSamplerUnnormalizedCoords",
        false,
        "Sampler uses unnormalized coordinates";
    SamplerAnisotropy = 30, "SAMPLER_ANISOTROPY", "msgSamplerAnisotropy", true,
        "Sampler enables anisotropic filtering";
    TileReadback = 31, "TILE_READBACK", "msgTileReadback", true,
        "Attachment loaded from memory at render pass begin";
    ClearAttachmentsAfterLoad = 32, "CLEAR_ATTACHMENTS_AFTER_LOAD", "msgClearAttachmentsAfterLoad",
        true,
        "vkCmdClearAttachments on an attachment that was loaded";
    ClearAttachmentsNoDrawCall = 33, "CLEAR_ATTACHMENTS_NO_DRAW_CALL",
        "msgClearAttachmentsNoDrawCall", true,
        "vkCmdClearAttachments before any draw in the render pass";
    RedundantRenderpassStore = 34, "REDUNDANT_RENDERPASS_STORE", "msgRedundantRenderpassStore",
        true,
        "Stored attachment overwritten before anything read it";
    RedundantImageClear = 35, "REDUNDANT_IMAGE_CLEAR", "msgRedundantImageClear", true,
        "Image cleared directly and then cleared again by LOAD_OP_CLEAR";
    InefficientClear = 36, "INEFFICIENT_CLEAR", "msgInefficientClear", true,
        "Image cleared directly and then loaded by LOAD_OP_LOAD";
    LazyTransientImageNotSupported = 37, "LAZY_TRANSIENT_IMAGE_NOT_SUPPORTED",
        "msgLazyTransientImageNotSupported", false,
        "Lazily allocated memory is not supported for transient images";
    UncompressedTextureUsed = 38, "UNCOMPRESSED_TEXTURE_USED", "msgUncompressedTextureUsed", true,
        "Sampled texture is uncompressed and not a render target";
    NonMipmappedTextureUsed = 39, "NON_MIPMAPPED_TEXTURE_USED", "msgNonMipmappedTextureUsed", true,
        "Sampled texture has a single mip level and is not a render target";
    NonIndexedDrawCall = 40, "NON_INDEXED_DRAW_CALL", "msgNonIndexedDrawCall", true,
        "Large non-indexed draw call";
    SuboptimalTextureFormat = 41, "SUBOPTIMAL_TEXTURE_FORMAT", "msgSuboptimalTextureFormat", true,
        "Texture format is suboptimal for sampling";
    TextureLinearTiling = 42, "TEXTURE_LINEAR_TILING", "msgTextureLinearTiling", true,
        "Sampled texture uses linear tiling";
    NoFbcdc = 43, "NO_FBCDC", "msgNoFBCDC", true,
        "Render target will not get framebuffer compression";
    RobustBufferAccessEnabled = 44, "ROBUST_BUFFER_ACCESS_ENABLED", "msgRobustBufferAccessEnabled",
        true,
        "robustBufferAccess enabled on the device";
    SuboptimalSubpassDependencyFlag = 45, "SUBOPTIMAL_SUBPASS_DEPENDENCY_FLAG",
        "msgSuboptimalSubpassDependencyFlag", true,
        "Subpass dependency flags are suboptimal";
    PartialClear = 46, "PARTIAL_CLEAR", "msgPartialClear", true,
        "Clear rect does not cover the whole render area";
    PipelineOptimisationDisabled = 47, "PIPELINE_OPTIMISATION_DISABLED",
        "msgPipelineOptimisationDisabled", true,
        "Pipeline created with optimisation disabled";
    WorkgroupSizeDivisor = 48, "WORKGROUP_SIZE_DIVISOR", "msgWorkgroupSizeDivisor", true,
        "Workgroup size is not a multiple of the preferred divisor";
    PotentialSubpass = 49, "POTENTIAL_SUBPASS", "msgPotentialSubpass", true,
        "Consecutive render passes on one framebuffer could be subpasses";
    SubpassStencilSelfDependency = 50, "SUBPASS_STENCIL_SELF_DEPENDENCY",
        "msgSubpassStencilSelfDependency", true,
        "Subpass has a stencil self dependency";
    InefficientDepthStencilOps = 51, "INEFFICIENT_DEPTH_STENCIL_OPS",
        "msgInefficientDepthStencilOps", true,
        "Depth/stencil load and store ops are inefficient";
    QueryBundleTooSmall = 52, "QUERY_BUNDLE_TOO_SMALL", "msgQueryBundleTooSmall", true,
        "Too few queries operated on at once";
}

impl MessageCode {
    pub const COUNT: usize = Self::ALL.len();

    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Dense index in `0..COUNT`, for counter tables.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    pub fn from_toggle_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.toggle_name() == name)
    }
}

impl TryFrom<u32> for MessageCode {
    type Error = UnknownMessageCode;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_raw() == raw)
            .ok_or(UnknownMessageCode(raw))
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_are_dense() {
        assert_eq!(MessageCode::COUNT, 52);
        for (i, code) in MessageCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), i);
            assert_eq!(code.as_raw() as usize, i + 1);
        }
    }

    #[test]
    fn stable_identities() {
        assert_eq!(MessageCode::TileReadback.as_raw(), 31);
        assert_eq!(MessageCode::PartialClear.as_raw(), 46);
        assert_eq!(MessageCode::QueryBundleTooSmall.as_raw(), 52);
        assert_eq!(MessageCode::try_from(43).unwrap(), MessageCode::NoFbcdc);
        assert!(MessageCode::try_from(0).is_err());
        assert!(MessageCode::try_from(53).is_err());
    }

    #[test]
    fn toggles_round_trip() {
        assert_eq!(
            MessageCode::from_toggle_name("msgNoFBCDC"),
            Some(MessageCode::NoFbcdc)
        );
        assert_eq!(MessageCode::from_toggle_name("msgNope"), None);
        for code in MessageCode::ALL {
            assert_eq!(MessageCode::from_toggle_name(code.toggle_name()), Some(*code));
        }
        assert!(!MessageCode::SamplerLodBias.enabled_by_default());
        assert!(MessageCode::PartialClear.enabled_by_default());
    }
}
