// SPDX-License-Identifier: CEPL-1.0
//! The boundary between the interception shim and the heuristic engine:
//! decoded API calls going in, diagnostics coming out.
use std::sync::Arc;

use ash::vk;

pub use tilelint_core::MessageCode;

/// What the engine keeps from `VkImageCreateInfo`.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub tiling: vk::ImageTiling,
    pub extent: vk::Extent3D,
}

impl ImageDesc {
    /// Single-sampled, single-level, optimally tiled 2D image.
    pub fn new(format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        ImageDesc {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels: 1,
            array_layers: 1,
            usage,
            tiling: vk::ImageTiling::OPTIMAL,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
        }
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        self
    }
}

impl From<&vk::ImageCreateInfo<'_>> for ImageDesc {
    fn from(info: &vk::ImageCreateInfo<'_>) -> Self {
        ImageDesc {
            format: info.format,
            samples: info.samples,
            mip_levels: info.mip_levels,
            array_layers: info.array_layers,
            usage: info.usage,
            tiling: info.tiling,
            extent: info.extent,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl From<&vk::BufferCreateInfo<'_>> for BufferDesc {
    fn from(info: &vk::BufferCreateInfo<'_>) -> Self {
        BufferDesc {
            size: info.size,
            usage: info.usage,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SamplerDesc {
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    pub min_lod: f32,
    pub max_lod: f32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub unnormalized_coordinates: bool,
}

impl SamplerDesc {
    pub fn address_modes(&self) -> [vk::SamplerAddressMode; 3] {
        [self.address_mode_u, self.address_mode_v, self.address_mode_w]
    }
}

impl From<&vk::SamplerCreateInfo<'_>> for SamplerDesc {
    fn from(info: &vk::SamplerCreateInfo<'_>) -> Self {
        SamplerDesc {
            address_mode_u: info.address_mode_u,
            address_mode_v: info.address_mode_v,
            address_mode_w: info.address_mode_w,
            border_color: info.border_color,
            min_lod: info.min_lod,
            max_lod: info.max_lod,
            mip_lod_bias: info.mip_lod_bias,
            anisotropy_enable: info.anisotropy_enable == vk::TRUE,
            unnormalized_coordinates: info.unnormalized_coordinates == vk::TRUE,
        }
    }
}

/// Attachment references of one subpass.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubpassLayout<'a> {
    pub color: &'a [vk::AttachmentReference],
    pub depth_stencil: Option<vk::AttachmentReference>,
}

/// One entry of `vkCmdClearAttachments`' `pAttachments`, without the clear value.
#[derive(Clone, Copy, Debug)]
pub struct ClearTarget {
    pub aspect_mask: vk::ImageAspectFlags,
    /// Index into the current subpass' color attachments; ignored for depth/stencil.
    pub color_attachment: u32,
}

impl ClearTarget {
    pub fn color(color_attachment: u32) -> Self {
        ClearTarget {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment,
        }
    }

    pub fn depth_stencil(aspect_mask: vk::ImageAspectFlags) -> Self {
        ClearTarget {
            aspect_mask,
            color_attachment: vk::ATTACHMENT_UNUSED,
        }
    }
}

/// An image written into a descriptor set by `vkUpdateDescriptorSets`.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorImageWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub image_view: vk::ImageView,
}

/// The layout part of a `VkImageMemoryBarrier`.
#[derive(Clone, Copy, Debug)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

/// One intercepted API entry point with the arguments the engine looks at.
#[derive(Clone, Copy, Debug)]
pub enum Call<'a> {
    CreateDevice {
        robust_buffer_access: bool,
    },
    AllocateMemory {
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    },
    FreeMemory {
        memory: vk::DeviceMemory,
    },
    CreateImage {
        image: vk::Image,
        desc: ImageDesc,
    },
    DestroyImage {
        image: vk::Image,
    },
    /// `size` is the image's `VkMemoryRequirements::size`.
    BindImageMemory {
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    CreateBuffer {
        buffer: vk::Buffer,
        desc: BufferDesc,
    },
    DestroyBuffer {
        buffer: vk::Buffer,
    },
    /// `size` is the buffer's `VkMemoryRequirements::size`.
    BindBufferMemory {
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    CreateImageView {
        view: vk::ImageView,
        image: vk::Image,
    },
    DestroyImageView {
        view: vk::ImageView,
    },
    CreateSampler {
        sampler: vk::Sampler,
        desc: SamplerDesc,
    },
    DestroySampler {
        sampler: vk::Sampler,
    },
    CreateRenderPass {
        render_pass: vk::RenderPass,
        attachments: &'a [vk::AttachmentDescription],
        subpasses: &'a [SubpassLayout<'a>],
    },
    DestroyRenderPass {
        render_pass: vk::RenderPass,
    },
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: &'a [vk::ImageView],
        extent: vk::Extent2D,
    },
    DestroyFramebuffer {
        framebuffer: vk::Framebuffer,
    },
    CreatePipeline {
        pipeline: vk::Pipeline,
        bind_point: vk::PipelineBindPoint,
        flags: vk::PipelineCreateFlags,
        cache: vk::PipelineCache,
    },
    DestroyPipeline {
        pipeline: vk::Pipeline,
    },
    CreateQueryPool {
        pool: vk::QueryPool,
        query_type: vk::QueryType,
        query_count: u32,
    },
    DestroyQueryPool {
        pool: vk::QueryPool,
    },
    ResetQueryPool {
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    },
    AllocateDescriptorSets {
        pool: vk::DescriptorPool,
        sets: &'a [vk::DescriptorSet],
    },
    UpdateDescriptorSets {
        writes: &'a [DescriptorImageWrite],
    },
    FreeDescriptorSets {
        sets: &'a [vk::DescriptorSet],
    },
    ResetDescriptorPool {
        pool: vk::DescriptorPool,
    },
    DestroyDescriptorPool {
        pool: vk::DescriptorPool,
    },
    AllocateCommandBuffers {
        pool: vk::CommandPool,
        command_buffers: &'a [vk::CommandBuffer],
    },
    ResetCommandPool {
        pool: vk::CommandPool,
    },
    DestroyCommandPool {
        pool: vk::CommandPool,
    },
    BeginCommandBuffer {
        command_buffer: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    },
    EndCommandBuffer {
        command_buffer: vk::CommandBuffer,
    },
    ResetCommandBuffer {
        command_buffer: vk::CommandBuffer,
    },
    FreeCommandBuffers {
        command_buffers: &'a [vk::CommandBuffer],
    },
    CmdBeginRenderPass {
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
    },
    CmdNextSubpass {
        command_buffer: vk::CommandBuffer,
    },
    CmdEndRenderPass {
        command_buffer: vk::CommandBuffer,
    },
    CmdDraw {
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
    },
    CmdDrawIndexed {
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
    },
    CmdClearAttachments {
        command_buffer: vk::CommandBuffer,
        attachments: &'a [ClearTarget],
        rects: &'a [vk::ClearRect],
    },
    CmdClearColorImage {
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
    },
    CmdClearDepthStencilImage {
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
    },
    CmdCopyImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdBlitImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdResolveImage {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_image: vk::Image,
    },
    CmdCopyImageToBuffer {
        command_buffer: vk::CommandBuffer,
        src_image: vk::Image,
        dst_buffer: vk::Buffer,
    },
    CmdCopyBufferToImage {
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
    },
    CmdBindDescriptorSets {
        command_buffer: vk::CommandBuffer,
        sets: &'a [vk::DescriptorSet],
    },
    CmdExecuteCommands {
        command_buffer: vk::CommandBuffer,
        secondaries: &'a [vk::CommandBuffer],
    },
    CmdPipelineBarrier {
        command_buffer: vk::CommandBuffer,
        image_barriers: &'a [ImageTransition],
    },
    CmdResetQueryPool {
        command_buffer: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    },
    QueueSubmit {
        queue: vk::Queue,
        command_buffers: &'a [vk::CommandBuffer],
    },
}

impl Call<'_> {
    /// The Vulkan entry point this call was intercepted from.
    pub fn name(&self) -> &'static str {
        match self {
            Call::CreateDevice { .. } => "vkCreateDevice",
            Call::AllocateMemory { .. } => "vkAllocateMemory",
            Call::FreeMemory { .. } => "vkFreeMemory",
            Call::CreateImage { .. } => "vkCreateImage",
            Call::DestroyImage { .. } => "vkDestroyImage",
            Call::BindImageMemory { .. } => "vkBindImageMemory",
            Call::CreateBuffer { .. } => "vkCreateBuffer",
            Call::DestroyBuffer { .. } => "vkDestroyBuffer",
            Call::BindBufferMemory { .. } => "vkBindBufferMemory",
            Call::CreateImageView { .. } => "vkCreateImageView",
            Call::DestroyImageView { .. } => "vkDestroyImageView",
            Call::CreateSampler { .. } => "vkCreateSampler",
            Call::DestroySampler { .. } => "vkDestroySampler",
            Call::CreateRenderPass { .. } => "vkCreateRenderPass",
            Call::DestroyRenderPass { .. } => "vkDestroyRenderPass",
            Call::CreateFramebuffer { .. } => "vkCreateFramebuffer",
            Call::DestroyFramebuffer { .. } => "vkDestroyFramebuffer",
            Call::CreatePipeline { .. } => "vkCreateGraphicsPipelines",
            Call::DestroyPipeline { .. } => "vkDestroyPipeline",
            Call::CreateQueryPool { .. } => "vkCreateQueryPool",
            Call::DestroyQueryPool { .. } => "vkDestroyQueryPool",
            Call::ResetQueryPool { .. } => "vkResetQueryPool",
            Call::AllocateDescriptorSets { .. } => "vkAllocateDescriptorSets",
            Call::UpdateDescriptorSets { .. } => "vkUpdateDescriptorSets",
            Call::FreeDescriptorSets { .. } => "vkFreeDescriptorSets",
            Call::ResetDescriptorPool { .. } => "vkResetDescriptorPool",
            Call::DestroyDescriptorPool { .. } => "vkDestroyDescriptorPool",
            Call::AllocateCommandBuffers { .. } => "vkAllocateCommandBuffers",
            Call::ResetCommandPool { .. } => "vkResetCommandPool",
            Call::DestroyCommandPool { .. } => "vkDestroyCommandPool",
            Call::BeginCommandBuffer { .. } => "vkBeginCommandBuffer",
            Call::EndCommandBuffer { .. } => "vkEndCommandBuffer",
            Call::ResetCommandBuffer { .. } => "vkResetCommandBuffer",
            Call::FreeCommandBuffers { .. } => "vkFreeCommandBuffers",
            Call::CmdBeginRenderPass { .. } => "vkCmdBeginRenderPass",
            Call::CmdNextSubpass { .. } => "vkCmdNextSubpass",
            Call::CmdEndRenderPass { .. } => "vkCmdEndRenderPass",
            Call::CmdDraw { .. } => "vkCmdDraw",
            Call::CmdDrawIndexed { .. } => "vkCmdDrawIndexed",
            Call::CmdClearAttachments { .. } => "vkCmdClearAttachments",
            Call::CmdClearColorImage { .. } => "vkCmdClearColorImage",
            Call::CmdClearDepthStencilImage { .. } => "vkCmdClearDepthStencilImage",
            Call::CmdCopyImage { .. } => "vkCmdCopyImage",
            Call::CmdBlitImage { .. } => "vkCmdBlitImage",
            Call::CmdResolveImage { .. } => "vkCmdResolveImage",
            Call::CmdCopyImageToBuffer { .. } => "vkCmdCopyImageToBuffer",
            Call::CmdCopyBufferToImage { .. } => "vkCmdCopyBufferToImage",
            Call::CmdBindDescriptorSets { .. } => "vkCmdBindDescriptorSets",
            Call::CmdExecuteCommands { .. } => "vkCmdExecuteCommands",
            Call::CmdPipelineBarrier { .. } => "vkCmdPipelineBarrier",
            Call::CmdResetQueryPool { .. } => "vkCmdResetQueryPool",
            Call::QueueSubmit { .. } => "vkQueueSubmit",
        }
    }
}

/// A diagnostic on its way to the sink.
#[derive(Clone, Copy, Debug)]
pub struct Message<'a> {
    pub code: MessageCode,
    pub object_type: vk::ObjectType,
    pub object: u64,
    pub text: &'a str,
}

/// Where diagnostics end up (log, debug callback, file).
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: &Message<'_>);
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn deliver(&self, message: &Message<'_>) {
        (**self).deliver(message);
    }
}

/// The next link in the call chain: the real driver, or a stand-in.
pub trait Dispatch {
    fn dispatch(&self, call: &Call<'_>);
}
