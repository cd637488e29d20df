// SPDX-License-Identifier: CEPL-1.0
//! Everything the rules know about live Vulkan objects.
//!
//! Lookups on identities that were never created, or have been destroyed,
//! come back as `None`; mutations on them do nothing.
use std::collections::{HashMap, HashSet};

use ash::vk;
use smallvec::SmallVec;
use tilelint_api::{BufferDesc, DescriptorImageWrite, ImageDesc, SamplerDesc, SubpassLayout};
use tracing::debug;

use crate::formats::{has_stencil, is_compressed_format};

/// Who last defined the contents of an image, and at which submission step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LastWrite {
    #[default]
    Unknown,
    Store(u64),
    DirectClear(u64),
    Transfer(u64),
    Discard(u64),
}

#[derive(Clone, Debug)]
pub struct ImageState {
    pub desc: ImageDesc,
    pub layout: vk::ImageLayout,
    pub memory: Option<(vk::DeviceMemory, vk::DeviceSize)>,
    pub last_write: LastWrite,
    pub last_read: Option<u64>,
}

impl ImageState {
    fn new(desc: ImageDesc) -> Self {
        ImageState {
            desc,
            layout: vk::ImageLayout::UNDEFINED,
            memory: None,
            last_write: LastWrite::Unknown,
            last_read: None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        is_compressed_format(self.desc.format)
    }

    pub fn is_render_target(&self) -> bool {
        self.desc.usage.intersects(
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    /// Whether anything consumed the contents after step `seq`.
    pub fn read_since(&self, seq: u64) -> bool {
        self.last_read.is_some_and(|read| read > seq)
    }
}

#[derive(Clone, Debug)]
pub struct BufferState {
    pub desc: BufferDesc,
    pub memory: Option<(vk::DeviceMemory, vk::DeviceSize)>,
}

/// Attachment references of one subpass, by attachment index.
#[derive(Clone, Debug, Default)]
pub struct SubpassRefs {
    pub color: SmallVec<[u32; 4]>,
    pub depth_stencil: Option<u32>,
}

impl From<&SubpassLayout<'_>> for SubpassRefs {
    fn from(layout: &SubpassLayout<'_>) -> Self {
        SubpassRefs {
            color: layout.color.iter().map(|r| r.attachment).collect(),
            depth_stencil: layout
                .depth_stencil
                .map(|r| r.attachment)
                .filter(|&a| a != vk::ATTACHMENT_UNUSED),
        }
    }
}

#[derive(Clone, Debug)]
struct RenderPassState {
    attachments: SmallVec<[vk::AttachmentDescription; 4]>,
    subpasses: SmallVec<[SubpassRefs; 1]>,
}

#[derive(Clone, Debug)]
struct FramebufferState {
    render_pass: vk::RenderPass,
    views: SmallVec<[vk::ImageView; 4]>,
    extent: vk::Extent2D,
}

#[derive(Clone, Copy, Debug)]
pub struct QueryPoolState {
    pub query_type: vk::QueryType,
    pub query_count: u32,
}

/// One framebuffer attachment with the ops its render pass applies to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentBinding {
    pub index: u32,
    /// `None` when the view behind the attachment is unknown.
    pub image: Option<vk::Image>,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
}

impl AttachmentBinding {
    /// The previous contents are read from memory at pass begin.
    pub fn loads(&self) -> bool {
        self.load_op == vk::AttachmentLoadOp::LOAD
            || (has_stencil(self.format) && self.stencil_load_op == vk::AttachmentLoadOp::LOAD)
    }

    /// The contents are written back to memory at pass end.
    pub fn stores(&self) -> bool {
        self.store_op == vk::AttachmentStoreOp::STORE
            || (has_stencil(self.format) && self.stencil_store_op == vk::AttachmentStoreOp::STORE)
    }
}

/// A render pass resolved through a framebuffer down to images.
#[derive(Clone, Debug)]
pub struct ResolvedPass {
    pub bindings: SmallVec<[AttachmentBinding; 4]>,
    pub subpasses: SmallVec<[SubpassRefs; 1]>,
    pub extent: vk::Extent2D,
}

#[derive(Default)]
pub struct ResourceTable {
    images: HashMap<vk::Image, ImageState>,
    buffers: HashMap<vk::Buffer, BufferState>,
    views: HashMap<vk::ImageView, vk::Image>,
    memory: HashMap<vk::DeviceMemory, vk::DeviceSize>,
    samplers: HashMap<vk::Sampler, SamplerDesc>,
    render_passes: HashMap<vk::RenderPass, RenderPassState>,
    framebuffers: HashMap<vk::Framebuffer, FramebufferState>,
    descriptor_sets: HashMap<vk::DescriptorSet, HashMap<(u32, u32), vk::Image>>,
    descriptor_pools: HashMap<vk::DescriptorPool, HashSet<vk::DescriptorSet>>,
    command_pools: HashMap<vk::CommandPool, HashSet<vk::CommandBuffer>>,
    query_pools: HashMap<vk::QueryPool, QueryPoolState>,
}

impl ResourceTable {
    pub fn on_create_image(&mut self, image: vk::Image, desc: ImageDesc) {
        self.images.insert(image, ImageState::new(desc));
    }

    pub fn on_destroy_image(&mut self, image: vk::Image) {
        if self.images.remove(&image).is_none() {
            debug!(?image, "destroy of unknown image");
        }
    }

    pub fn on_bind_image_memory(
        &mut self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) {
        match self.images.get_mut(&image) {
            Some(state) => state.memory = Some((memory, offset)),
            None => debug!(?image, "memory bound to unknown image"),
        }
    }

    pub fn on_transition_layout(&mut self, image: vk::Image, layout: vk::ImageLayout) {
        if let Some(state) = self.images.get_mut(&image) {
            state.layout = layout;
        }
    }

    pub fn on_create_buffer(&mut self, buffer: vk::Buffer, desc: BufferDesc) {
        self.buffers.insert(buffer, BufferState { desc, memory: None });
    }

    pub fn on_destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.buffers.remove(&buffer);
    }

    pub fn on_bind_buffer_memory(
        &mut self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) {
        match self.buffers.get_mut(&buffer) {
            Some(state) => state.memory = Some((memory, offset)),
            None => debug!(?buffer, "memory bound to unknown buffer"),
        }
    }

    pub fn on_allocate_memory(&mut self, memory: vk::DeviceMemory, size: vk::DeviceSize) {
        self.memory.insert(memory, size);
    }

    pub fn on_free_memory(&mut self, memory: vk::DeviceMemory) {
        self.memory.remove(&memory);
    }

    pub fn on_create_image_view(&mut self, view: vk::ImageView, image: vk::Image) {
        // Swapchain images never pass through vkCreateImage; keep the link anyway.
        self.views.insert(view, image);
    }

    pub fn on_destroy_image_view(&mut self, view: vk::ImageView) {
        self.views.remove(&view);
    }

    pub fn on_create_sampler(&mut self, sampler: vk::Sampler, desc: SamplerDesc) {
        self.samplers.insert(sampler, desc);
    }

    pub fn on_destroy_sampler(&mut self, sampler: vk::Sampler) {
        self.samplers.remove(&sampler);
    }

    pub fn on_create_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::AttachmentDescription],
        subpasses: &[SubpassLayout<'_>],
    ) {
        self.render_passes.insert(
            render_pass,
            RenderPassState {
                attachments: attachments.iter().copied().collect(),
                subpasses: subpasses.iter().map(SubpassRefs::from).collect(),
            },
        );
    }

    pub fn on_destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.render_passes.remove(&render_pass);
    }

    pub fn on_create_framebuffer(
        &mut self,
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) {
        self.framebuffers.insert(
            framebuffer,
            FramebufferState {
                render_pass,
                views: views.iter().copied().collect(),
                extent,
            },
        );
    }

    /// Returns whether the framebuffer was known.
    pub fn on_destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) -> bool {
        self.framebuffers.remove(&framebuffer).is_some()
    }

    pub fn on_create_query_pool(
        &mut self,
        pool: vk::QueryPool,
        query_type: vk::QueryType,
        query_count: u32,
    ) {
        self.query_pools.insert(
            pool,
            QueryPoolState {
                query_type,
                query_count,
            },
        );
    }

    pub fn on_destroy_query_pool(&mut self, pool: vk::QueryPool) {
        self.query_pools.remove(&pool);
    }

    /// Records which image a descriptor slot now points at. Returns it when known.
    pub fn on_write_descriptor(&mut self, write: &DescriptorImageWrite) -> Option<vk::Image> {
        let Some(&image) = self.views.get(&write.image_view) else {
            debug!(view = ?write.image_view, "descriptor write of unknown image view");
            return None;
        };
        self.descriptor_sets
            .entry(write.set)
            .or_default()
            .insert((write.binding, write.array_element), image);
        Some(image)
    }

    /// Sets come back from allocation empty, even when the driver hands out
    /// a handle it used before.
    pub fn on_allocate_descriptor_sets(
        &mut self,
        pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) {
        let owned = self.descriptor_pools.entry(pool).or_default();
        for &set in sets {
            owned.insert(set);
            self.descriptor_sets.remove(&set);
        }
    }

    pub fn on_free_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.descriptor_sets.remove(&set);
        for owned in self.descriptor_pools.values_mut() {
            if owned.remove(&set) {
                break;
            }
        }
    }

    /// Frees every set allocated from `pool`. The pool itself stays usable.
    pub fn on_reset_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        let Some(owned) = self.descriptor_pools.get_mut(&pool) else {
            debug!(?pool, "reset of unknown descriptor pool");
            return;
        };
        for set in owned.drain() {
            self.descriptor_sets.remove(&set);
        }
    }

    pub fn on_destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        self.on_reset_descriptor_pool(pool);
        self.descriptor_pools.remove(&pool);
    }

    pub fn on_allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        command_buffers: &[vk::CommandBuffer],
    ) {
        self.command_pools
            .entry(pool)
            .or_default()
            .extend(command_buffers.iter().copied());
    }

    pub fn on_free_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        for owned in self.command_pools.values_mut() {
            if owned.remove(&command_buffer) {
                break;
            }
        }
    }

    /// Command buffers currently allocated from `pool`.
    pub fn command_buffers_in_pool(&self, pool: vk::CommandPool) -> Vec<vk::CommandBuffer> {
        self.command_pools
            .get(&pool)
            .map(|owned| owned.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forgets `pool` and hands back the command buffers that went with it.
    pub fn on_destroy_command_pool(&mut self, pool: vk::CommandPool) -> Vec<vk::CommandBuffer> {
        self.command_pools
            .remove(&pool)
            .map(|owned| owned.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn image(&self, image: vk::Image) -> Option<&ImageState> {
        self.images.get(&image)
    }

    pub fn image_mut(&mut self, image: vk::Image) -> Option<&mut ImageState> {
        self.images.get_mut(&image)
    }

    pub fn buffer(&self, buffer: vk::Buffer) -> Option<&BufferState> {
        self.buffers.get(&buffer)
    }

    pub fn image_for_view(&self, view: vk::ImageView) -> Option<vk::Image> {
        self.views.get(&view).copied()
    }

    pub fn sampler(&self, sampler: vk::Sampler) -> Option<&SamplerDesc> {
        self.samplers.get(&sampler)
    }

    pub fn allocation_size(&self, memory: vk::DeviceMemory) -> Option<vk::DeviceSize> {
        self.memory.get(&memory).copied()
    }

    pub fn query_pool(&self, pool: vk::QueryPool) -> Option<QueryPoolState> {
        self.query_pools.get(&pool).copied()
    }

    pub fn is_compressed_format(&self, image: vk::Image) -> Option<bool> {
        self.image(image).map(ImageState::is_compressed)
    }

    pub fn is_render_target_usage(&self, image: vk::Image) -> Option<bool> {
        self.image(image).map(ImageState::is_render_target)
    }

    pub fn sample_count(&self, image: vk::Image) -> Option<vk::SampleCountFlags> {
        self.image(image).map(|state| state.desc.samples)
    }

    pub fn mip_levels(&self, image: vk::Image) -> Option<u32> {
        self.image(image).map(|state| state.desc.mip_levels)
    }

    /// Images referenced by the given descriptor sets, deduplicated.
    pub fn images_in_sets(&self, sets: &[vk::DescriptorSet]) -> SmallVec<[vk::Image; 8]> {
        let mut images = SmallVec::<[vk::Image; 8]>::new();
        for slots in sets.iter().filter_map(|set| self.descriptor_sets.get(set)) {
            for &image in slots.values() {
                if !images.contains(&image) {
                    images.push(image);
                }
            }
        }
        images
    }

    /// Resolves `render_pass` through `framebuffer`. `None` if either is unknown.
    pub fn resolve_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
    ) -> Option<ResolvedPass> {
        let rp = self.render_passes.get(&render_pass)?;
        let fb = self.framebuffers.get(&framebuffer)?;
        if fb.render_pass != render_pass {
            // Compatible passes share attachment layouts; the ops come from `render_pass`.
            debug!(
                ?framebuffer,
                ?render_pass,
                "framebuffer created against a different render pass"
            );
        }
        let bindings = rp
            .attachments
            .iter()
            .enumerate()
            .map(|(i, desc)| AttachmentBinding {
                index: i as u32,
                image: fb.views.get(i).and_then(|view| self.image_for_view(*view)),
                format: desc.format,
                load_op: desc.load_op,
                store_op: desc.store_op,
                stencil_load_op: desc.stencil_load_op,
                stencil_store_op: desc.stencil_store_op,
            })
            .collect();
        Some(ResolvedPass {
            bindings,
            subpasses: rp.subpasses.clone(),
            extent: fb.extent,
        })
    }
}
