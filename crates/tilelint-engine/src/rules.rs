// SPDX-License-Identifier: CEPL-1.0
//! Rules evaluated at the moment a call is observed. Each takes the state
//! it needs and pushes what it finds; enablement is applied by the caller.
use ash::vk::{self, Handle};
use smallvec::SmallVec;
use tilelint_api::{ClearTarget, ImageDesc, SamplerDesc};
use tilelint_config::Thresholds;
use tilelint_core::MessageCode;

use crate::formats::FbcdcTable;
use crate::recording::{ActivePass, DrawCallStats};
use crate::resources::{AttachmentBinding, ImageState};

#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub code: MessageCode,
    pub object_type: vk::ObjectType,
    pub object: u64,
    pub text: String,
}

impl Finding {
    pub fn new(code: MessageCode, object_type: vk::ObjectType, object: u64, text: String) -> Self {
        Finding {
            code,
            object_type,
            object,
            text,
        }
    }
}

pub type Findings = SmallVec<[Finding; 4]>;

fn covers(area: &vk::Rect2D, rect: &vk::Rect2D) -> bool {
    let (ax, ay) = (i64::from(area.offset.x), i64::from(area.offset.y));
    let (rx, ry) = (i64::from(rect.offset.x), i64::from(rect.offset.y));
    rx <= ax
        && ry <= ay
        && rx + i64::from(rect.extent.width) >= ax + i64::from(area.extent.width)
        && ry + i64::from(rect.extent.height) >= ay + i64::from(area.extent.height)
}

pub fn tile_readback(pass: &ActivePass, command_buffer: vk::CommandBuffer, out: &mut Findings) {
    for binding in pass.bindings.iter().filter(|b| b.loads()) {
        out.push(Finding::new(
            MessageCode::TileReadback,
            vk::ObjectType::COMMAND_BUFFER,
            command_buffer.as_raw(),
            format!(
                "Attachment {} is loaded from memory at render pass begin (LOAD_OP_LOAD). \
                 Use LOAD_OP_CLEAR or LOAD_OP_DONT_CARE unless the previous contents are needed.",
                binding.index
            ),
        ));
    }
}

/// `draw_occurred` is passed separately: a clear inherited from a secondary
/// also counts the secondary's own draws.
pub fn clear_attachments(
    pass: &ActivePass,
    targets: &[ClearTarget],
    rects: &[vk::ClearRect],
    draw_occurred: bool,
    command_buffer: vk::CommandBuffer,
    out: &mut Findings,
) {
    let partial = rects.iter().any(|r| !covers(&pass.render_area, &r.rect));
    let object = command_buffer.as_raw();
    for target in targets {
        let what = if target.aspect_mask.contains(vk::ImageAspectFlags::COLOR) {
            format!("color attachment {}", target.color_attachment)
        } else {
            "the depth/stencil attachment".to_owned()
        };

        if partial {
            out.push(Finding::new(
                MessageCode::PartialClear,
                vk::ObjectType::COMMAND_BUFFER,
                object,
                format!(
                    "vkCmdClearAttachments on {what} does not cover the full render area. \
                     Partial clears run as a quad and are not free."
                ),
            ));
        }

        if let Some(binding) = pass.clear_target(target.aspect_mask, target.color_attachment) {
            let color_or_depth = target
                .aspect_mask
                .intersects(vk::ImageAspectFlags::COLOR | vk::ImageAspectFlags::DEPTH);
            let loaded = (color_or_depth && binding.load_op == vk::AttachmentLoadOp::LOAD)
                || (target.aspect_mask.contains(vk::ImageAspectFlags::STENCIL)
                    && binding.stencil_load_op == vk::AttachmentLoadOp::LOAD);
            if loaded {
                out.push(Finding::new(
                    MessageCode::ClearAttachmentsAfterLoad,
                    vk::ObjectType::COMMAND_BUFFER,
                    object,
                    format!(
                        "vkCmdClearAttachments on {what}, which was loaded with LOAD_OP_LOAD. \
                         Use LOAD_OP_CLEAR instead."
                    ),
                ));
            }
        }

        if !draw_occurred {
            out.push(Finding::new(
                MessageCode::ClearAttachmentsNoDrawCall,
                vk::ObjectType::COMMAND_BUFFER,
                object,
                format!(
                    "vkCmdClearAttachments on {what} before any draw call. \
                     Use LOAD_OP_CLEAR instead."
                ),
            ));
        }
    }
}

/// Checked when a framebuffer is created: attachments whose contents never
/// touch memory belong in transient images, and only those.
pub fn transient_attachment(
    framebuffer: vk::Framebuffer,
    binding: &AttachmentBinding,
    usage: vk::ImageUsageFlags,
    out: &mut Findings,
) {
    let transient = usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT);
    let uses_memory = binding.loads() || binding.stores();
    if uses_memory && transient {
        out.push(Finding::new(
            MessageCode::FramebufferAttachmentShouldNotBeTransient,
            vk::ObjectType::FRAMEBUFFER,
            framebuffer.as_raw(),
            format!(
                "Attachment {} is loaded or stored but its image has \
                 IMAGE_USAGE_TRANSIENT_ATTACHMENT_BIT set.",
                binding.index
            ),
        ));
    } else if !uses_memory && !transient {
        out.push(Finding::new(
            MessageCode::FramebufferAttachmentShouldBeTransient,
            vk::ObjectType::FRAMEBUFFER,
            framebuffer.as_raw(),
            format!(
                "Attachment {} is neither loaded nor stored. Create its image with \
                 IMAGE_USAGE_TRANSIENT_ATTACHMENT_BIT and back it with lazily allocated memory.",
                binding.index
            ),
        ));
    }
}

pub fn non_indexed_draw(
    vertex_count: u32,
    t: &Thresholds,
    command_buffer: vk::CommandBuffer,
    out: &mut Findings,
) {
    if u64::from(vertex_count) > t.max_small_drawcall_vertices {
        out.push(Finding::new(
            MessageCode::NonIndexedDrawCall,
            vk::ObjectType::COMMAND_BUFFER,
            command_buffer.as_raw(),
            format!(
                "Non-indexed draw of {vertex_count} vertices. \
                 Indexed draws make better use of the post-transform cache."
            ),
        ));
    }
}

pub fn small_indexed_draws(
    stats: &DrawCallStats,
    t: &Thresholds,
    command_buffer: vk::CommandBuffer,
    out: &mut Findings,
) {
    if stats.small_indexed_draws > t.max_small_indexed_drawcalls {
        out.push(Finding::new(
            MessageCode::ManySmallIndexedDrawcalls,
            vk::ObjectType::COMMAND_BUFFER,
            command_buffer.as_raw(),
            format!(
                "Command buffer recorded {} indexed draws of {} indices or fewer. \
                 Batch small draws together.",
                stats.small_indexed_draws, t.small_indexed_drawcall_indices
            ),
        ));
    }
}

pub fn simultaneous_use(
    flags: vk::CommandBufferUsageFlags,
    command_buffer: vk::CommandBuffer,
    out: &mut Findings,
) {
    if flags.contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE) {
        out.push(Finding::new(
            MessageCode::CommandBufferSimultaneousUse,
            vk::ObjectType::COMMAND_BUFFER,
            command_buffer.as_raw(),
            "Command buffer begun with COMMAND_BUFFER_USAGE_SIMULTANEOUS_USE_BIT. \
             Some drivers patch a copy of the command buffer on every submit."
                .to_owned(),
        ));
    }
}

pub fn image_creation(
    image: vk::Image,
    desc: &ImageDesc,
    t: &Thresholds,
    fbcdc: &FbcdcTable,
    out: &mut Findings,
) {
    let attachment = desc.usage.intersects(
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    );
    if attachment && !fbcdc.supports(desc.format, desc.samples) {
        out.push(Finding::new(
            MessageCode::NoFbcdc,
            vk::ObjectType::IMAGE,
            image.as_raw(),
            format!(
                "Render target with format {:?} at {:?} samples \
                 will not use framebuffer compression.",
                desc.format, desc.samples
            ),
        ));
    }
    if u64::from(desc.samples.as_raw()) > t.max_efficient_samples {
        out.push(Finding::new(
            MessageCode::TooLargeSampleCount,
            vk::ObjectType::IMAGE,
            image.as_raw(),
            format!(
                "Image created with {} samples; \
                 more than {} samples do not run at full throughput.",
                desc.samples.as_raw(),
                t.max_efficient_samples
            ),
        ));
    }
}

/// An image just written into a sampled descriptor.
pub fn sampled_image(image: vk::Image, state: &ImageState, out: &mut Findings) {
    let object = image.as_raw();
    let render_target = state.is_render_target();
    if !render_target && !state.is_compressed() {
        out.push(Finding::new(
            MessageCode::UncompressedTextureUsed,
            vk::ObjectType::IMAGE,
            object,
            format!(
                "Texture {object:#x} with format {:?} is sampled but not block compressed.",
                state.desc.format
            ),
        ));
    }
    if !render_target && state.desc.mip_levels == 1 {
        out.push(Finding::new(
            MessageCode::NonMipmappedTextureUsed,
            vk::ObjectType::IMAGE,
            object,
            format!("Texture {object:#x} is sampled but has a single mip level."),
        ));
    }
    if state.desc.tiling == vk::ImageTiling::LINEAR {
        out.push(Finding::new(
            MessageCode::TextureLinearTiling,
            vk::ObjectType::IMAGE,
            object,
            format!("Texture {object:#x} is sampled with linear tiling. Use IMAGE_TILING_OPTIMAL."),
        ));
    }
}

pub fn pipeline_creation(
    pipeline: vk::Pipeline,
    flags: vk::PipelineCreateFlags,
    cache: vk::PipelineCache,
    out: &mut Findings,
) {
    if flags.contains(vk::PipelineCreateFlags::DISABLE_OPTIMIZATION) {
        out.push(Finding::new(
            MessageCode::PipelineOptimisationDisabled,
            vk::ObjectType::PIPELINE,
            pipeline.as_raw(),
            "Pipeline created with VK_PIPELINE_CREATE_DISABLE_OPTIMIZATION_BIT.".to_owned(),
        ));
    }
    if cache == vk::PipelineCache::null() {
        out.push(Finding::new(
            MessageCode::NoPipelineCache,
            vk::ObjectType::PIPELINE,
            pipeline.as_raw(),
            "Pipeline created without a VkPipelineCache. \
             A cache persisted across runs avoids recompiling at startup."
                .to_owned(),
        ));
    }
}

pub fn query_reset(pool: vk::QueryPool, query_count: u32, t: &Thresholds, out: &mut Findings) {
    if u64::from(query_count) < t.min_query_count {
        out.push(Finding::new(
            MessageCode::QueryBundleTooSmall,
            vk::ObjectType::QUERY_POOL,
            pool.as_raw(),
            format!(
                "Query pool reset covers {query_count} queries; \
                 operate on at least {} at once.",
                t.min_query_count
            ),
        ));
    }
}

pub fn allocation(
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    t: &Thresholds,
    out: &mut Findings,
) {
    if size < t.min_device_allocation_size {
        out.push(Finding::new(
            MessageCode::SmallAllocation,
            vk::ObjectType::DEVICE_MEMORY,
            memory.as_raw(),
            format!(
                "vkAllocateMemory of {size} bytes; \
                 suballocate from blocks of at least {} bytes.",
                t.min_device_allocation_size
            ),
        ));
    }
}

/// A resource bound at offset 0 whose requirements span the whole allocation.
/// `allocation_size` is `None` for memory that was never seen allocated.
pub fn dedicated_allocation(
    object_type: vk::ObjectType,
    object: u64,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    allocation_size: Option<vk::DeviceSize>,
    t: &Thresholds,
    out: &mut Findings,
) {
    let Some(allocation_size) = allocation_size else { return };
    if offset == 0 && size == allocation_size && size < t.min_dedicated_allocation_size {
        out.push(Finding::new(
            MessageCode::SmallDedicatedAllocation,
            object_type,
            object,
            format!(
                "A {size} byte resource consumes a whole VkDeviceMemory. \
                 Suballocate resources smaller than {} bytes from larger blocks.",
                t.min_dedicated_allocation_size
            ),
        ));
    }
}

pub fn sampler(sampler: vk::Sampler, desc: &SamplerDesc, t: &Thresholds, out: &mut Findings) {
    let object = sampler.as_raw();
    let [u, v, w] = desc.address_modes();
    if u != v || u != w {
        out.push(Finding::new(
            MessageCode::DissimilarWrapping,
            vk::ObjectType::SAMPLER,
            object,
            format!("Sampler uses different address modes per axis ({u:?}, {v:?}, {w:?})."),
        ));
    }
    let border_clamp = desc
        .address_modes()
        .contains(&vk::SamplerAddressMode::CLAMP_TO_BORDER);
    let transparent_black = matches!(
        desc.border_color,
        vk::BorderColor::FLOAT_TRANSPARENT_BLACK | vk::BorderColor::INT_TRANSPARENT_BLACK
    );
    if border_clamp && !transparent_black {
        out.push(Finding::new(
            MessageCode::SamplerBorderClampColor,
            vk::ObjectType::SAMPLER,
            object,
            format!(
                "Sampler clamps to border color {:?}. Transparent black borders are cheaper.",
                desc.border_color
            ),
        ));
    }
    if desc.min_lod != 0.0 || f64::from(desc.max_lod) < t.unclamped_max_lod {
        out.push(Finding::new(
            MessageCode::SamplerLodClamping,
            vk::ObjectType::SAMPLER,
            object,
            format!(
                "Sampler clamps LOD to [{}, {}]; clamping may cost extra sampling cycles.",
                desc.min_lod, desc.max_lod
            ),
        ));
    }
    if desc.mip_lod_bias != 0.0 {
        out.push(Finding::new(
            MessageCode::SamplerLodBias,
            vk::ObjectType::SAMPLER,
            object,
            format!("Sampler has a LOD bias of {}.", desc.mip_lod_bias),
        ));
    }
    if desc.anisotropy_enable {
        out.push(Finding::new(
            MessageCode::SamplerAnisotropy,
            vk::ObjectType::SAMPLER,
            object,
            "Sampler has anisotropic filtering enabled.".to_owned(),
        ));
    }
    if desc.unnormalized_coordinates {
        out.push(Finding::new(
            MessageCode::SamplerUnnormalizedCoords,
            vk::ObjectType::SAMPLER,
            object,
            "Sampler uses unnormalized coordinates.".to_owned(),
        ));
    }
}
