// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk::{self, Handle};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tilelint_api::{Call, Message, MessageSink};
use tilelint_config::Config;
use tilelint_core::MessageCode;
use tracing::{debug, trace};

use crate::formats::FbcdcTable;
use crate::history::SubmissionHistory;
use crate::recording::{CommandBufferState, Deferred, InheritedClear};
use crate::reporter::Reporter;
use crate::resources::ResourceTable;
use crate::rules::{self, Finding, Findings};

/// The heuristic engine: tracks state from the call stream and raises
/// diagnostics through its [`Reporter`].
///
/// Every method takes `&self`; calls from different threads may interleave
/// as long as each command buffer is recorded from one thread at a time,
/// which Vulkan already requires.
pub struct Engine {
    config: Config,
    fbcdc: FbcdcTable,
    reporter: Reporter,
    resources: Mutex<ResourceTable>,
    history: Mutex<SubmissionHistory>,
    command_buffers: DashMap<vk::CommandBuffer, CommandBufferState>,
}

/// A secondary command buffer as it stood when `vkCmdExecuteCommands` ran.
struct ExecutedSecondary {
    command_buffer: vk::CommandBuffer,
    stream: Arc<[Deferred]>,
    draws: u64,
    clears: Vec<InheritedClear>,
}

impl Engine {
    pub fn new(config: Config, sink: Box<dyn MessageSink>) -> Self {
        Engine {
            config,
            fbcdc: FbcdcTable::default(),
            reporter: Reporter::new(sink),
            resources: Mutex::new(ResourceTable::default()),
            history: Mutex::new(SubmissionHistory::default()),
            command_buffers: DashMap::new(),
        }
    }

    /// Replaces the framebuffer-compression policy.
    pub fn with_fbcdc_table(mut self, table: FbcdcTable) -> Self {
        self.fbcdc = table;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn count(&self, code: MessageCode) -> u32 {
        self.reporter.count(code)
    }

    /// Zeroes every counter. Tracked state is kept.
    pub fn reset(&self) {
        self.reporter.reset();
    }

    pub fn with_resources<R>(&self, f: impl FnOnce(&ResourceTable) -> R) -> R {
        f(&self.resources.lock())
    }

    /// Read access to the render passes replayed so far.
    pub fn with_history<R>(&self, f: impl FnOnce(&SubmissionHistory) -> R) -> R {
        f(&self.history.lock())
    }

    pub fn observe(&self, call: &Call<'_>) {
        trace!(call = call.name());
        let t = &self.config.thresholds;
        let mut out = Findings::new();

        match *call {
            Call::CreateDevice {
                robust_buffer_access,
            } => {
                if robust_buffer_access {
                    out.push(Finding::new(
                        MessageCode::RobustBufferAccessEnabled,
                        vk::ObjectType::DEVICE,
                        0,
                        "robustBufferAccess is enabled. It can cost performance on some GPUs."
                            .to_owned(),
                    ));
                }
            }
            Call::AllocateMemory { memory, size } => {
                self.resources.lock().on_allocate_memory(memory, size);
                rules::allocation(memory, size, t, &mut out);
            }
            Call::FreeMemory { memory } => self.resources.lock().on_free_memory(memory),
            Call::CreateImage { image, desc } => {
                self.resources.lock().on_create_image(image, desc);
                rules::image_creation(image, &desc, t, &self.fbcdc, &mut out);
            }
            Call::DestroyImage { image } => self.resources.lock().on_destroy_image(image),
            Call::BindImageMemory {
                image,
                memory,
                offset,
                size,
            } => {
                let mut resources = self.resources.lock();
                resources.on_bind_image_memory(image, memory, offset);
                let allocation = resources.allocation_size(memory);
                rules::dedicated_allocation(
                    vk::ObjectType::IMAGE,
                    image.as_raw(),
                    offset,
                    size,
                    allocation,
                    t,
                    &mut out,
                );
            }
            Call::CreateBuffer { buffer, desc } => {
                self.resources.lock().on_create_buffer(buffer, desc)
            }
            Call::DestroyBuffer { buffer } => self.resources.lock().on_destroy_buffer(buffer),
            Call::BindBufferMemory {
                buffer,
                memory,
                offset,
                size,
            } => {
                let mut resources = self.resources.lock();
                resources.on_bind_buffer_memory(buffer, memory, offset);
                let allocation = resources.allocation_size(memory);
                rules::dedicated_allocation(
                    vk::ObjectType::BUFFER,
                    buffer.as_raw(),
                    offset,
                    size,
                    allocation,
                    t,
                    &mut out,
                );
            }
            Call::CreateImageView { view, image } => {
                self.resources.lock().on_create_image_view(view, image)
            }
            Call::DestroyImageView { view } => self.resources.lock().on_destroy_image_view(view),
            Call::CreateSampler { sampler, desc } => {
                self.resources.lock().on_create_sampler(sampler, desc);
                rules::sampler(sampler, &desc, t, &mut out);
            }
            Call::DestroySampler { sampler } => self.resources.lock().on_destroy_sampler(sampler),
            Call::CreateRenderPass {
                render_pass,
                attachments,
                subpasses,
            } => self
                .resources
                .lock()
                .on_create_render_pass(render_pass, attachments, subpasses),
            Call::DestroyRenderPass { render_pass } => {
                self.resources.lock().on_destroy_render_pass(render_pass)
            }
            Call::CreateFramebuffer {
                framebuffer,
                render_pass,
                attachments,
                extent,
            } => {
                let mut resources = self.resources.lock();
                resources.on_create_framebuffer(framebuffer, render_pass, attachments, extent);
                let resolved = resources.resolve_pass(render_pass, framebuffer);
                if resolved.is_none() {
                    debug!(?framebuffer, "framebuffer created against unknown render pass");
                }
                for binding in resolved.iter().flat_map(|pass| &pass.bindings) {
                    // Swapchain images have no tracked usage.
                    let Some(state) = binding.image.and_then(|image| resources.image(image))
                    else {
                        continue;
                    };
                    rules::transient_attachment(framebuffer, binding, state.desc.usage, &mut out);
                }
            }
            Call::DestroyFramebuffer { framebuffer } => {
                let mut resources = self.resources.lock();
                if !resources.on_destroy_framebuffer(framebuffer) {
                    debug!(?framebuffer, "destroy of unknown framebuffer");
                }
                self.history.lock().forget(framebuffer);
            }
            Call::CreatePipeline {
                pipeline,
                flags,
                cache,
                ..
            } => rules::pipeline_creation(pipeline, flags, cache, &mut out),
            Call::DestroyPipeline { .. } => {}
            Call::CreateQueryPool {
                pool,
                query_type,
                query_count,
            } => self
                .resources
                .lock()
                .on_create_query_pool(pool, query_type, query_count),
            Call::DestroyQueryPool { pool } => self.resources.lock().on_destroy_query_pool(pool),
            Call::ResetQueryPool {
                pool, query_count, ..
            } => self.query_reset(pool, query_count, &mut out),
            Call::AllocateDescriptorSets { pool, sets } => {
                self.resources.lock().on_allocate_descriptor_sets(pool, sets)
            }
            Call::UpdateDescriptorSets { writes } => {
                let mut resources = self.resources.lock();
                for write in writes {
                    let Some(image) = resources.on_write_descriptor(write) else {
                        continue;
                    };
                    let sampled = matches!(
                        write.descriptor_type,
                        vk::DescriptorType::SAMPLED_IMAGE
                            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                    );
                    match resources.image(image) {
                        Some(state) if sampled => rules::sampled_image(image, state, &mut out),
                        Some(_) => {}
                        None => debug!(?image, "descriptor references unknown image"),
                    }
                }
            }
            Call::FreeDescriptorSets { sets } => {
                let mut resources = self.resources.lock();
                for &set in sets {
                    resources.on_free_descriptor_set(set);
                }
            }
            Call::ResetDescriptorPool { pool } => {
                self.resources.lock().on_reset_descriptor_pool(pool)
            }
            Call::DestroyDescriptorPool { pool } => {
                self.resources.lock().on_destroy_descriptor_pool(pool)
            }

            Call::AllocateCommandBuffers {
                pool,
                command_buffers,
            } => {
                self.resources
                    .lock()
                    .on_allocate_command_buffers(pool, command_buffers);
                // A recycled handle starts with nothing recorded.
                for cb in command_buffers {
                    self.command_buffers.remove(cb);
                }
            }
            Call::ResetCommandPool { pool } => {
                let owned = self.resources.lock().command_buffers_in_pool(pool);
                for cb in owned {
                    if let Some(mut state) = self.command_buffers.get_mut(&cb) {
                        state.reset();
                    }
                }
            }
            Call::DestroyCommandPool { pool } => {
                let owned = self.resources.lock().on_destroy_command_pool(pool);
                for cb in owned {
                    self.command_buffers.remove(&cb);
                }
            }
            Call::BeginCommandBuffer {
                command_buffer,
                flags,
            } => {
                self.recording(command_buffer).reset();
                rules::simultaneous_use(flags, command_buffer, &mut out);
            }
            Call::EndCommandBuffer { command_buffer } => {
                let mut state = self.recording(command_buffer);
                rules::small_indexed_draws(&state.stats, t, command_buffer, &mut out);
                state.finish();
            }
            Call::ResetCommandBuffer { command_buffer } => {
                if let Some(mut state) = self.command_buffers.get_mut(&command_buffer) {
                    state.reset();
                }
                out.push(Finding::new(
                    MessageCode::CommandBufferReset,
                    vk::ObjectType::COMMAND_BUFFER,
                    command_buffer.as_raw(),
                    "Command buffer reset individually. Reset the whole command pool instead."
                        .to_owned(),
                ));
            }
            Call::FreeCommandBuffers { command_buffers } => {
                let mut resources = self.resources.lock();
                for cb in command_buffers {
                    resources.on_free_command_buffer(*cb);
                }
                drop(resources);
                for cb in command_buffers {
                    self.command_buffers.remove(cb);
                }
            }
            Call::CmdBeginRenderPass {
                command_buffer,
                render_pass,
                framebuffer,
                render_area,
            } => {
                let resolved = self.resources.lock().resolve_pass(render_pass, framebuffer);
                let mut state = self.recording(command_buffer);
                state.begin_render_pass(framebuffer, render_area, resolved);
                if let Some(pass) = state.active_pass() {
                    rules::tile_readback(pass, command_buffer, &mut out);
                }
            }
            Call::CmdNextSubpass { command_buffer } => {
                self.recording(command_buffer).next_subpass()
            }
            Call::CmdEndRenderPass { command_buffer } => {
                self.recording(command_buffer).end_render_pass()
            }
            Call::CmdDraw {
                command_buffer,
                vertex_count,
                ..
            } => {
                self.recording(command_buffer).record_draw(vertex_count);
                rules::non_indexed_draw(vertex_count, t, command_buffer, &mut out);
            }
            Call::CmdDrawIndexed {
                command_buffer,
                index_count,
                ..
            } => self
                .recording(command_buffer)
                .record_draw_indexed(index_count, t.small_indexed_drawcall_indices),
            Call::CmdClearAttachments {
                command_buffer,
                attachments,
                rects,
            } => {
                let mut state = self.recording(command_buffer);
                match state.active_pass() {
                    Some(pass) => rules::clear_attachments(
                        pass,
                        attachments,
                        rects,
                        pass.draw_occurred,
                        command_buffer,
                        &mut out,
                    ),
                    // A secondary continuing its primary's pass.
                    None => state.inherit_clear(attachments, rects),
                }
                state.mark_cleared();
            }
            Call::CmdClearColorImage {
                command_buffer,
                image,
            }
            | Call::CmdClearDepthStencilImage {
                command_buffer,
                image,
            } => self
                .recording(command_buffer)
                .defer(Deferred::DirectClear(image)),
            Call::CmdCopyImage {
                command_buffer,
                src_image,
                dst_image,
            }
            | Call::CmdBlitImage {
                command_buffer,
                src_image,
                dst_image,
            } => {
                let mut state = self.recording(command_buffer);
                state.defer(Deferred::Read(src_image));
                state.defer(Deferred::Write(dst_image));
            }
            Call::CmdResolveImage {
                command_buffer,
                src_image,
                dst_image,
            } => {
                let mut state = self.recording(command_buffer);
                state.defer(Deferred::Read(src_image));
                state.defer(Deferred::Write(dst_image));
                out.push(Finding::new(
                    MessageCode::ResolveImage,
                    vk::ObjectType::COMMAND_BUFFER,
                    command_buffer.as_raw(),
                    "vkCmdResolveImage used. \
                     Resolve inside the render pass with pResolveAttachments instead."
                        .to_owned(),
                ));
            }
            Call::CmdCopyImageToBuffer {
                command_buffer,
                src_image,
                ..
            } => self
                .recording(command_buffer)
                .defer(Deferred::Read(src_image)),
            Call::CmdCopyBufferToImage {
                command_buffer,
                dst_image,
                ..
            } => self
                .recording(command_buffer)
                .defer(Deferred::Write(dst_image)),
            Call::CmdBindDescriptorSets {
                command_buffer,
                sets,
            } => {
                let images = self.resources.lock().images_in_sets(sets);
                let mut state = self.recording(command_buffer);
                for image in images {
                    state.defer(Deferred::Read(image));
                }
            }
            Call::CmdExecuteCommands {
                command_buffer,
                secondaries,
            } => self.execute_commands(command_buffer, secondaries, &mut out),
            Call::CmdPipelineBarrier {
                command_buffer,
                image_barriers,
            } => {
                let mut state = self.recording(command_buffer);
                for barrier in image_barriers {
                    state.defer(Deferred::Transition(barrier.image, barrier.new_layout));
                }
            }
            Call::CmdResetQueryPool {
                pool, query_count, ..
            } => self.query_reset(pool, query_count, &mut out),
            Call::QueueSubmit {
                queue,
                command_buffers,
            } => {
                trace!(?queue, count = command_buffers.len(), "submit");
                self.submit(command_buffers, &mut out);
            }
        }

        self.flush(out);
    }

    /// Lazily creates state for command buffers seen mid-recording.
    fn recording(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> RefMut<'_, vk::CommandBuffer, CommandBufferState> {
        self.command_buffers.entry(command_buffer).or_default()
    }

    fn query_reset(&self, pool: vk::QueryPool, query_count: u32, out: &mut Findings) {
        if self.resources.lock().query_pool(pool).is_none() {
            debug!(?pool, "reset of unknown query pool");
            return;
        }
        rules::query_reset(pool, query_count, &self.config.thresholds, out);
    }

    fn execute_commands(
        &self,
        primary: vk::CommandBuffer,
        secondaries: &[vk::CommandBuffer],
        out: &mut Findings,
    ) {
        // Collected first: a secondary may live in the primary's shard.
        let executed: SmallVec<[ExecutedSecondary; 2]> = secondaries
            .iter()
            .filter_map(|&cb| {
                let state = self.command_buffers.get(&cb)?;
                Some(ExecutedSecondary {
                    command_buffer: cb,
                    stream: state.executable()?,
                    draws: state.stats.draws,
                    clears: state.inherited_clears().to_vec(),
                })
            })
            .collect();

        let mut state = self.recording(primary);
        for secondary in &executed {
            if !secondary.clears.is_empty() {
                match state.active_pass() {
                    Some(pass) => {
                        for clear in &secondary.clears {
                            rules::clear_attachments(
                                pass,
                                &clear.targets,
                                &clear.rects,
                                pass.draw_occurred || clear.after_draw,
                                secondary.command_buffer,
                                out,
                            );
                        }
                    }
                    None => debug!(
                        ?primary,
                        secondary = ?secondary.command_buffer,
                        "secondary with vkCmdClearAttachments executed outside a render pass"
                    ),
                }
                state.mark_cleared();
            }
            state.execute_secondary(&secondary.stream, secondary.draws);
        }
    }

    fn submit(&self, command_buffers: &[vk::CommandBuffer], out: &mut Findings) {
        // Shard guards are released before the shared tables are locked.
        let streams: SmallVec<[Arc<[Deferred]>; 4]> = command_buffers
            .iter()
            .filter_map(|cb| {
                let stream = self.command_buffers.get(cb).and_then(|state| state.executable());
                if stream.is_none() {
                    debug!(command_buffer = ?cb, "submitted command buffer has no ended recording");
                }
                stream
            })
            .collect();

        let mut resources = self.resources.lock();
        let mut history = self.history.lock();
        for stream in &streams {
            history.replay(stream, &mut resources, out);
        }
    }

    fn flush(&self, findings: Findings) {
        for f in findings.iter().filter(|f| self.config.is_enabled(f.code)) {
            self.reporter.emit(&Message {
                code: f.code,
                object_type: f.object_type,
                object: f.object,
                text: &f.text,
            });
        }
    }
}
