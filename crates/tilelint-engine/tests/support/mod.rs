// SPDX-License-Identifier: CEPL-1.0
#![allow(dead_code)]
use std::cell::Cell;
use std::sync::Arc;

use ash::vk::{self, Handle};
use tilelint_engine::formats::has_depth;
use tilelint_engine::{Call, Config, Engine, ImageDesc, MemorySink, MessageCode, SubpassLayout};

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 128;

/// A fresh engine plus handle allocation and the usual object setup.
pub struct Harness {
    pub engine: Engine,
    pub sink: Arc<MemorySink>,
    next: Cell<u64>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let sink = Arc::new(MemorySink::default());
        Harness {
            engine: Engine::new(config, Box::new(Arc::clone(&sink))),
            sink,
            next: Cell::new(0x1000),
        }
    }

    pub fn handle<H: Handle>(&self) -> H {
        let raw = self.next.get();
        self.next.set(raw + 1);
        H::from_raw(raw)
    }

    pub fn observe(&self, call: Call<'_>) {
        self.engine.observe(&call);
    }

    pub fn count(&self, code: MessageCode) -> u32 {
        self.engine.count(code)
    }

    pub fn image(&self, desc: ImageDesc) -> (vk::Image, vk::ImageView) {
        let (image, view) = (self.handle(), self.handle());
        self.observe(Call::CreateImage { image, desc });
        self.observe(Call::CreateImageView { view, image });
        (image, view)
    }

    pub fn color_target(&self) -> (vk::Image, vk::ImageView) {
        self.image(
            ImageDesc::new(
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .extent(WIDTH, HEIGHT),
        )
    }

    /// Single-subpass render pass; depth formats become the depth/stencil attachment.
    pub fn render_pass(&self, attachments: &[vk::AttachmentDescription]) -> vk::RenderPass {
        let render_pass = self.handle();
        let color: Vec<vk::AttachmentReference> = attachments
            .iter()
            .enumerate()
            .filter(|(_, a)| !has_depth(a.format))
            .map(|(i, _)| vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_stencil = attachments
            .iter()
            .position(|a| has_depth(a.format))
            .map(|i| vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });
        self.observe(Call::CreateRenderPass {
            render_pass,
            attachments,
            subpasses: &[SubpassLayout {
                color: &color,
                depth_stencil,
            }],
        });
        render_pass
    }

    pub fn framebuffer(
        &self,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
    ) -> vk::Framebuffer {
        let framebuffer = self.handle();
        self.observe(Call::CreateFramebuffer {
            framebuffer,
            render_pass,
            attachments: views,
            extent: vk::Extent2D {
                width: WIDTH,
                height: HEIGHT,
            },
        });
        framebuffer
    }

    /// Color target, one-attachment render pass and framebuffer in one go.
    pub fn color_pass(
        &self,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Target {
        let (image, view) = self.color_target();
        self.pass_on(image, view, load_op, store_op)
    }

    /// One-attachment render pass and framebuffer over an existing color image.
    pub fn pass_on(
        &self,
        image: vk::Image,
        view: vk::ImageView,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Target {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, load_op, store_op);
        let render_pass = self.render_pass(&[color]);
        let framebuffer = self.framebuffer(render_pass, &[view]);
        Target {
            image,
            view,
            render_pass,
            framebuffer,
        }
    }

    pub fn begin(&self) -> vk::CommandBuffer {
        let command_buffer = self.handle();
        self.observe(Call::BeginCommandBuffer {
            command_buffer,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        });
        command_buffer
    }

    pub fn begin_pass(&self, command_buffer: vk::CommandBuffer, target: &Target) {
        self.observe(Call::CmdBeginRenderPass {
            command_buffer,
            render_pass: target.render_pass,
            framebuffer: target.framebuffer,
            render_area: full_area(),
        });
    }

    pub fn end_pass(&self, command_buffer: vk::CommandBuffer) {
        self.observe(Call::CmdEndRenderPass { command_buffer });
    }

    pub fn draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32) {
        self.observe(Call::CmdDraw {
            command_buffer,
            vertex_count,
            instance_count: 1,
        });
    }

    pub fn end_and_submit(&self, command_buffer: vk::CommandBuffer) {
        self.observe(Call::EndCommandBuffer { command_buffer });
        self.observe(Call::QueueSubmit {
            queue: vk::Queue::from_raw(1),
            command_buffers: &[command_buffer],
        });
    }

    /// Records `work` into a fresh command buffer and submits it.
    pub fn submit_work(&self, work: impl FnOnce(vk::CommandBuffer)) {
        let command_buffer = self.begin();
        work(command_buffer);
        self.end_and_submit(command_buffer);
    }

    /// An empty render pass on `target`, in its own submission.
    pub fn submit_pass(&self, target: &Target) {
        self.submit_work(|cb| {
            self.begin_pass(cb, target);
            self.end_pass(cb);
        });
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Target {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
}

pub fn attachment(
    format: vk::Format,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op,
        store_op,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::GENERAL,
        ..Default::default()
    }
}

pub fn full_area() -> vk::Rect2D {
    rect(0, 0, WIDTH, HEIGHT)
}

pub fn rect(x: i32, y: i32, width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x, y },
        extent: vk::Extent2D { width, height },
    }
}

pub fn clear_rect(rect: vk::Rect2D) -> vk::ClearRect {
    vk::ClearRect {
        rect,
        base_array_layer: 0,
        layer_count: 1,
    }
}
