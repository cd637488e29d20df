// SPDX-License-Identifier: CEPL-1.0
//! Per-command-buffer recording state: the render-pass state machine, draw
//! statistics, and the deferred stream that is replayed at submit.
use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;
use tilelint_api::ClearTarget;
use tracing::debug;

use crate::resources::{AttachmentBinding, ResolvedPass, SubpassRefs};

#[derive(Clone, Copy, Debug, Default)]
pub struct DrawCallStats {
    pub draws: u64,
    pub draws_in_pass: u64,
    pub last_vertex_count: u32,
    pub last_index_count: u32,
    pub last_indexed: bool,
    /// Small indexed draws since the command buffer began recording.
    pub small_indexed_draws: u64,
}

#[derive(Clone, Debug)]
pub struct ActivePass {
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    /// Empty when the render pass or framebuffer was unknown at begin.
    pub bindings: SmallVec<[AttachmentBinding; 4]>,
    pub subpasses: SmallVec<[SubpassRefs; 1]>,
    pub subpass: u32,
    pub draw_occurred: bool,
    pub cleared_since_draw: bool,
    pub cleared_mid_pass: bool,
}

impl ActivePass {
    /// The binding behind a `vkCmdClearAttachments` target in the current subpass.
    pub fn clear_target(
        &self,
        aspect_mask: vk::ImageAspectFlags,
        color_attachment: u32,
    ) -> Option<&AttachmentBinding> {
        let subpass = self.subpasses.get(self.subpass as usize)?;
        let index = if aspect_mask.contains(vk::ImageAspectFlags::COLOR) {
            *subpass.color.get(color_attachment as usize)?
        } else {
            subpass.depth_stencil?
        };
        self.bindings.iter().find(|b| b.index == index)
    }
}

#[derive(Clone, Debug, Default)]
pub enum RenderPassContext {
    #[default]
    Idle,
    InPass(ActivePass),
}

/// What a finished render pass left behind, replayed at submit.
#[derive(Clone, Debug)]
pub struct RenderPassExecution {
    pub framebuffer: vk::Framebuffer,
    pub bindings: SmallVec<[AttachmentBinding; 4]>,
    pub subpass_count: u32,
    pub draw_occurred: bool,
    pub cleared_mid_pass: bool,
}

/// A `vkCmdClearAttachments` recorded with no render pass open, as a
/// secondary continuing its primary's pass does. Evaluated against the pass
/// that is open where the secondary is executed.
#[derive(Clone, Debug)]
pub struct InheritedClear {
    pub targets: SmallVec<[ClearTarget; 2]>,
    pub rects: SmallVec<[vk::ClearRect; 2]>,
    /// The recording command buffer had drawn before the clear.
    pub after_draw: bool,
}

/// Image-content events whose effect depends on submission order.
#[derive(Clone, Debug)]
pub enum Deferred {
    DirectClear(vk::Image),
    Read(vk::Image),
    Write(vk::Image),
    Transition(vk::Image, vk::ImageLayout),
    RenderPass(RenderPassExecution),
}

#[derive(Debug, Default)]
pub struct CommandBufferState {
    pub pass: RenderPassContext,
    pub stats: DrawCallStats,
    recorded: Vec<Deferred>,
    executable: Option<Arc<[Deferred]>>,
    inherited_clears: Vec<InheritedClear>,
}

impl CommandBufferState {
    /// `vkBeginCommandBuffer` and `vkResetCommandBuffer` both start over.
    pub fn reset(&mut self) {
        *self = CommandBufferState::default();
    }

    pub fn defer(&mut self, action: Deferred) {
        self.recorded.push(action);
    }

    /// Freezes the recorded stream for submission.
    pub fn finish(&mut self) {
        if let RenderPassContext::InPass(pass) = &self.pass {
            debug!(framebuffer = ?pass.framebuffer, "command buffer ended inside a render pass");
            self.pass = RenderPassContext::Idle;
        }
        self.executable = Some(Arc::from(std::mem::take(&mut self.recorded)));
    }

    /// The stream as of the last `finish`; empty for a buffer never ended.
    pub fn executable(&self) -> Option<Arc<[Deferred]>> {
        self.executable.clone()
    }

    pub fn begin_render_pass(
        &mut self,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        resolved: Option<ResolvedPass>,
    ) {
        if matches!(self.pass, RenderPassContext::InPass(_)) {
            debug!(?framebuffer, "render pass begun inside another; dropping the open one");
        }
        let (bindings, subpasses) = match resolved {
            Some(resolved) => (resolved.bindings, resolved.subpasses),
            None => {
                debug!(
                    ?framebuffer,
                    "render pass begun on unknown objects; attachment rules disabled"
                );
                Default::default()
            }
        };
        self.stats.draws_in_pass = 0;
        self.pass = RenderPassContext::InPass(ActivePass {
            framebuffer,
            render_area,
            bindings,
            subpasses,
            subpass: 0,
            draw_occurred: false,
            cleared_since_draw: false,
            cleared_mid_pass: false,
        });
    }

    pub fn next_subpass(&mut self) {
        if let RenderPassContext::InPass(pass) = &mut self.pass {
            pass.subpass += 1;
        }
    }

    /// Queues the finished pass for replay. No-op outside a render pass.
    pub fn end_render_pass(&mut self) {
        let RenderPassContext::InPass(pass) = std::mem::take(&mut self.pass) else {
            debug!("vkCmdEndRenderPass outside a render pass");
            return;
        };
        let subpass_count = pass.subpasses.len().max(1) as u32;
        self.recorded.push(Deferred::RenderPass(RenderPassExecution {
            framebuffer: pass.framebuffer,
            bindings: pass.bindings,
            subpass_count,
            draw_occurred: pass.draw_occurred,
            cleared_mid_pass: pass.cleared_mid_pass,
        }));
    }

    pub fn record_draw(&mut self, vertex_count: u32) {
        self.stats.last_vertex_count = vertex_count;
        self.stats.last_indexed = false;
        self.stats.draws += 1;
        self.mark_draws(1);
    }

    pub fn record_draw_indexed(&mut self, index_count: u32, small_threshold: u64) {
        self.stats.last_index_count = index_count;
        self.stats.last_indexed = true;
        if u64::from(index_count) <= small_threshold {
            self.stats.small_indexed_draws += 1;
        }
        self.stats.draws += 1;
        self.mark_draws(1);
    }

    /// Splices an ended secondary command buffer into this recording.
    pub fn execute_secondary(&mut self, stream: &[Deferred], draws: u64) {
        self.recorded.extend(stream.iter().cloned());
        if draws > 0 {
            self.stats.draws += draws;
            self.mark_draws(draws);
        }
    }

    fn mark_draws(&mut self, draws: u64) {
        if let RenderPassContext::InPass(pass) = &mut self.pass {
            pass.draw_occurred = true;
            pass.cleared_since_draw = false;
            self.stats.draws_in_pass += draws;
        }
    }

    pub fn active_pass(&self) -> Option<&ActivePass> {
        match &self.pass {
            RenderPassContext::InPass(pass) => Some(pass),
            RenderPassContext::Idle => None,
        }
    }

    pub fn inherit_clear(&mut self, targets: &[ClearTarget], rects: &[vk::ClearRect]) {
        self.inherited_clears.push(InheritedClear {
            targets: targets.iter().copied().collect(),
            rects: rects.iter().copied().collect(),
            after_draw: self.stats.draws > 0,
        });
    }

    pub fn inherited_clears(&self) -> &[InheritedClear] {
        &self.inherited_clears
    }

    pub fn mark_cleared(&mut self) {
        if let RenderPassContext::InPass(pass) = &mut self.pass {
            pass.cleared_since_draw = true;
            pass.cleared_mid_pass = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn area() -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: 16, height: 16 },
        }
    }

    #[test]
    fn pass_state_machine() {
        let mut cb = CommandBufferState::default();
        let fb = vk::Framebuffer::from_raw(3);
        assert!(cb.active_pass().is_none());

        cb.begin_render_pass(fb, area(), None);
        let pass = cb.active_pass().unwrap();
        assert!(!pass.draw_occurred && !pass.cleared_since_draw);

        cb.mark_cleared();
        assert!(cb.active_pass().unwrap().cleared_since_draw);
        cb.record_draw(3);
        let pass = cb.active_pass().unwrap();
        assert!(pass.draw_occurred && !pass.cleared_since_draw && pass.cleared_mid_pass);
        assert_eq!(cb.stats.draws_in_pass, 1);

        cb.end_render_pass();
        assert!(cb.active_pass().is_none());
        cb.finish();
        let stream = cb.executable().unwrap();
        let [Deferred::RenderPass(exec)] = &stream[..] else {
            panic!("expected one render pass, got {stream:?}");
        };
        assert_eq!(exec.framebuffer, fb);
        assert!(exec.draw_occurred && exec.cleared_mid_pass);
        assert_eq!(exec.subpass_count, 1);
    }

    #[test]
    fn draws_outside_a_pass_only_touch_stats() {
        let mut cb = CommandBufferState::default();
        cb.record_draw_indexed(6, 10);
        cb.record_draw_indexed(11, 10);
        cb.end_render_pass();
        assert_eq!(cb.stats.small_indexed_draws, 1);
        assert_eq!(cb.stats.draws_in_pass, 0);
        assert!(cb.stats.last_indexed);
        assert_eq!(cb.stats.last_index_count, 11);
    }

    #[test]
    fn secondary_draws_land_in_the_open_pass() {
        let mut secondary = CommandBufferState::default();
        secondary.record_draw(3);
        secondary.defer(Deferred::Write(vk::Image::from_raw(9)));
        secondary.finish();

        let mut primary = CommandBufferState::default();
        primary.begin_render_pass(vk::Framebuffer::from_raw(1), area(), None);
        let stream = secondary.executable().unwrap();
        primary.execute_secondary(&stream, secondary.stats.draws);
        assert!(primary.active_pass().unwrap().draw_occurred);
        assert_eq!(primary.stats.draws_in_pass, 1);
        primary.end_render_pass();
        primary.finish();
        let stream = primary.executable().unwrap();
        assert!(matches!(stream[0], Deferred::Write(_)));
        assert!(matches!(stream[1], Deferred::RenderPass(_)));
    }

    #[test]
    fn clears_outside_a_pass_are_kept_for_the_executing_pass() {
        let mut secondary = CommandBufferState::default();
        let rect = vk::ClearRect {
            rect: area(),
            base_array_layer: 0,
            layer_count: 1,
        };
        secondary.inherit_clear(&[ClearTarget::color(0)], &[rect]);
        secondary.record_draw(3);
        secondary.inherit_clear(&[ClearTarget::color(1)], &[rect]);
        secondary.finish();

        let clears = secondary.inherited_clears();
        assert_eq!(clears.len(), 2);
        assert!(!clears[0].after_draw);
        assert!(clears[1].after_draw);
        assert_eq!(clears[1].targets[0].color_attachment, 1);

        secondary.reset();
        assert!(secondary.inherited_clears().is_empty());
    }

    #[test]
    fn reset_drops_everything() {
        let mut cb = CommandBufferState::default();
        cb.defer(Deferred::Read(vk::Image::from_raw(1)));
        cb.finish();
        cb.begin_render_pass(vk::Framebuffer::from_raw(1), area(), None);
        cb.reset();
        assert!(cb.active_pass().is_none());
        assert!(cb.executable().is_none());
        assert_eq!(cb.stats.small_indexed_draws, 0);
    }
}
