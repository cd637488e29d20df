// SPDX-License-Identifier: CEPL-1.0
//! Submission-ordered view of render-pass executions and the replay that
//! evaluates rules spanning more than one pass.
//!
//! The records are also readable from outside through
//! [`Engine::with_history`](crate::Engine::with_history).
use std::collections::HashMap;

use ash::vk::{self, Handle};
use smallvec::SmallVec;
use tilelint_core::MessageCode;
use tracing::debug;

use crate::recording::{Deferred, RenderPassExecution};
use crate::resources::{AttachmentBinding, LastWrite, ResourceTable};
use crate::rules::{Finding, Findings};

/// One render pass as it executed on the queue.
#[derive(Clone, Debug)]
pub struct RenderPassRecord {
    pub framebuffer: vk::Framebuffer,
    pub bindings: SmallVec<[AttachmentBinding; 4]>,
    pub subpass_count: u32,
    /// At least one draw ran inside the pass, counting executed secondaries.
    pub draw_occurred: bool,
    /// `vkCmdClearAttachments` ran inside the pass.
    pub cleared_mid_pass: bool,
    /// Replay step at which the pass ended.
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct SubmissionHistory {
    clock: u64,
    /// Two most recent executions per framebuffer, oldest first.
    by_framebuffer: HashMap<vk::Framebuffer, [Option<RenderPassRecord>; 2]>,
    last_framebuffer: Option<vk::Framebuffer>,
}

impl SubmissionHistory {
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Most recent execution on `framebuffer`.
    pub fn previous(&self, framebuffer: vk::Framebuffer) -> Option<&RenderPassRecord> {
        self.by_framebuffer.get(&framebuffer)?[1].as_ref()
    }

    /// The execution before [`previous`](Self::previous). Kept for callers
    /// comparing frame N against frame N-2, e.g. with double-buffered targets.
    pub fn before_previous(&self, framebuffer: vk::Framebuffer) -> Option<&RenderPassRecord> {
        self.by_framebuffer.get(&framebuffer)?[0].as_ref()
    }

    /// Framebuffer of the most recent execution on any framebuffer.
    pub fn last_framebuffer(&self) -> Option<vk::Framebuffer> {
        self.last_framebuffer
    }

    pub fn publish(&mut self, record: RenderPassRecord) {
        self.last_framebuffer = Some(record.framebuffer);
        let ring = self.by_framebuffer.entry(record.framebuffer).or_default();
        ring[0] = ring[1].take();
        ring[1] = Some(record);
    }

    pub fn forget(&mut self, framebuffer: vk::Framebuffer) {
        self.by_framebuffer.remove(&framebuffer);
        if self.last_framebuffer == Some(framebuffer) {
            self.last_framebuffer = None;
        }
    }

    /// Replays one command buffer's stream against the shared state.
    pub(crate) fn replay(
        &mut self,
        stream: &[Deferred],
        resources: &mut ResourceTable,
        out: &mut Findings,
    ) {
        for action in stream {
            let seq = self.tick();
            match action {
                Deferred::Read(image) => {
                    if let Some(state) = resources.image_mut(*image) {
                        state.last_read = Some(seq);
                    }
                }
                Deferred::Write(image) => {
                    if let Some(state) = resources.image_mut(*image) {
                        state.last_write = LastWrite::Transfer(seq);
                    }
                }
                Deferred::Transition(image, layout) => {
                    resources.on_transition_layout(*image, *layout)
                }
                Deferred::DirectClear(image) => {
                    let Some(state) = resources.image_mut(*image) else {
                        debug!(?image, "clear of unknown image");
                        continue;
                    };
                    if let LastWrite::Store(stored) = state.last_write {
                        if !state.read_since(stored) {
                            out.push(Finding::new(
                                MessageCode::RedundantRenderpassStore,
                                vk::ObjectType::IMAGE,
                                image.as_raw(),
                                format!(
                                    "Image {:#x} was stored by a render pass and then cleared \
                                     without being read. Use STORE_OP_DONT_CARE for it.",
                                    image.as_raw()
                                ),
                            ));
                        }
                    }
                    state.last_write = LastWrite::DirectClear(seq);
                }
                Deferred::RenderPass(exec) => self.execute_render_pass(exec, seq, resources, out),
            }
        }
    }

    fn execute_render_pass(
        &mut self,
        exec: &RenderPassExecution,
        seq: u64,
        resources: &mut ResourceTable,
        out: &mut Findings,
    ) {
        for binding in &exec.bindings {
            let Some(image) = binding.image else { continue };
            let Some(state) = resources.image_mut(image) else {
                continue;
            };
            if let LastWrite::DirectClear(cleared) = state.last_write {
                if !state.read_since(cleared) {
                    match binding.load_op {
                        vk::AttachmentLoadOp::LOAD => out.push(Finding::new(
                            MessageCode::InefficientClear,
                            vk::ObjectType::IMAGE,
                            image.as_raw(),
                            format!(
                                "Image {:#x} was cleared with vkCmdClear*Image and then loaded \
                                 by a render pass. Use LOAD_OP_CLEAR instead.",
                                image.as_raw()
                            ),
                        )),
                        vk::AttachmentLoadOp::CLEAR => out.push(Finding::new(
                            MessageCode::RedundantImageClear,
                            vk::ObjectType::IMAGE,
                            image.as_raw(),
                            format!(
                                "Image {:#x} was cleared with vkCmdClear*Image and then cleared \
                                 again by LOAD_OP_CLEAR. The first clear is redundant.",
                                image.as_raw()
                            ),
                        )),
                        _ => {}
                    }
                }
            }
            if binding.loads() {
                state.last_read = Some(seq);
            }
        }

        if let Some(prev) = self.previous(exec.framebuffer) {
            for binding in exec.bindings.iter().filter(|b| !b.loads()) {
                let Some(image) = binding.image else { continue };
                let stored_before = prev.bindings.iter().any(|p| {
                    p.index == binding.index && p.image == Some(image) && p.stores()
                });
                if !stored_before {
                    continue;
                }
                let Some(state) = resources.image(image) else {
                    continue;
                };
                if state.last_write == LastWrite::Store(prev.seq) && !state.read_since(prev.seq) {
                    out.push(Finding::new(
                        MessageCode::RedundantRenderpassStore,
                        vk::ObjectType::IMAGE,
                        image.as_raw(),
                        format!(
                            "Attachment {} (image {:#x}) was stored by the previous render pass \
                             on framebuffer {:#x} and overwritten without being read. \
                             Use STORE_OP_DONT_CARE for it.",
                            binding.index,
                            image.as_raw(),
                            exec.framebuffer.as_raw()
                        ),
                    ));
                }
            }
            let back_to_back = self.last_framebuffer == Some(exec.framebuffer);
            if back_to_back && prev.subpass_count == 1 && exec.subpass_count == 1 {
                out.push(Finding::new(
                    MessageCode::PotentialSubpass,
                    vk::ObjectType::FRAMEBUFFER,
                    exec.framebuffer.as_raw(),
                    format!(
                        "Two consecutive render passes ran on framebuffer {:#x}. \
                         Consider merging them into one render pass with multiple subpasses.",
                        exec.framebuffer.as_raw()
                    ),
                ));
            }
        }

        for binding in &exec.bindings {
            let Some(state) = binding.image.and_then(|image| resources.image_mut(image)) else {
                continue;
            };
            state.last_write = if binding.stores() {
                LastWrite::Store(seq)
            } else {
                LastWrite::Discard(seq)
            };
        }

        self.publish(RenderPassRecord {
            framebuffer: exec.framebuffer,
            bindings: exec.bindings.clone(),
            subpass_count: exec.subpass_count,
            draw_occurred: exec.draw_occurred,
            cleared_mid_pass: exec.cleared_mid_pass,
            seq,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilelint_api::ImageDesc;

    const LOAD: vk::AttachmentLoadOp = vk::AttachmentLoadOp::LOAD;
    const CLEAR: vk::AttachmentLoadOp = vk::AttachmentLoadOp::CLEAR;
    const STORE: vk::AttachmentStoreOp = vk::AttachmentStoreOp::STORE;

    fn binding(
        image: vk::Image,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> AttachmentBinding {
        AttachmentBinding {
            index: 0,
            image: Some(image),
            format: vk::Format::R8G8B8A8_UNORM,
            load_op,
            store_op,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        }
    }

    fn pass(fb: vk::Framebuffer, binding: AttachmentBinding) -> Deferred {
        Deferred::RenderPass(RenderPassExecution {
            framebuffer: fb,
            bindings: smallvec::smallvec![binding],
            subpass_count: 1,
            draw_occurred: true,
            cleared_mid_pass: false,
        })
    }

    fn codes(out: &Findings) -> Vec<MessageCode> {
        out.iter().map(|f| f.code).collect()
    }

    fn color_target(resources: &mut ResourceTable, image: vk::Image) {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        resources.on_create_image(image, ImageDesc::new(vk::Format::R8G8B8A8_UNORM, usage));
    }

    fn setup() -> (ResourceTable, vk::Image) {
        let mut resources = ResourceTable::default();
        let image = vk::Image::from_raw(0x10);
        color_target(&mut resources, image);
        (resources, image)
    }

    #[test]
    fn ring_keeps_two_per_framebuffer() {
        let mut history = SubmissionHistory::default();
        let (mut resources, image) = setup();
        let fb = vk::Framebuffer::from_raw(1);
        let clear_store = pass(fb, binding(image, CLEAR, STORE));
        let stream = [clear_store.clone(), clear_store.clone(), clear_store];
        let mut out = Findings::new();
        history.replay(&stream, &mut resources, &mut out);
        assert_eq!(history.previous(fb).unwrap().seq, 3);
        assert_eq!(history.before_previous(fb).unwrap().seq, 2);
        assert_eq!(history.last_framebuffer(), Some(fb));

        history.forget(fb);
        assert!(history.previous(fb).is_none());
        assert!(history.last_framebuffer().is_none());
    }

    #[test]
    fn unread_store_then_overwrite() {
        let mut history = SubmissionHistory::default();
        let (mut resources, image) = setup();
        let (fb, other) = (vk::Framebuffer::from_raw(1), vk::Framebuffer::from_raw(2));
        let other_image = vk::Image::from_raw(0x20);
        color_target(&mut resources, other_image);

        let mut out = Findings::new();
        history.replay(
            &[
                pass(fb, binding(image, CLEAR, STORE)),
                pass(other, binding(other_image, CLEAR, STORE)),
                pass(fb, binding(image, CLEAR, STORE)),
            ],
            &mut resources,
            &mut out,
        );
        assert_eq!(codes(&out), [MessageCode::RedundantRenderpassStore]);
    }

    #[test]
    fn read_between_passes_consumes_the_store() {
        let mut history = SubmissionHistory::default();
        let (mut resources, image) = setup();
        let fb = vk::Framebuffer::from_raw(1);
        let other = vk::Framebuffer::from_raw(2);
        let mut out = Findings::new();
        history.replay(
            &[
                pass(fb, binding(image, CLEAR, STORE)),
                Deferred::Read(image),
                pass(other, binding(vk::Image::from_raw(0x99), CLEAR, STORE)),
                pass(fb, binding(image, CLEAR, STORE)),
            ],
            &mut resources,
            &mut out,
        );
        assert!(out.is_empty(), "{:?}", codes(&out));
    }

    #[test]
    fn back_to_back_passes_suggest_subpass() {
        let mut history = SubmissionHistory::default();
        let (mut resources, image) = setup();
        let fb = vk::Framebuffer::from_raw(1);
        let mut out = Findings::new();
        history.replay(
            &[
                pass(fb, binding(image, CLEAR, STORE)),
                pass(fb, binding(image, LOAD, STORE)),
            ],
            &mut resources,
            &mut out,
        );
        assert_eq!(codes(&out), [MessageCode::PotentialSubpass]);
    }

    #[test]
    fn direct_clear_pairs_are_exclusive() {
        for (load_op, expected) in [
            (LOAD, Some(MessageCode::InefficientClear)),
            (CLEAR, Some(MessageCode::RedundantImageClear)),
            (vk::AttachmentLoadOp::DONT_CARE, None),
        ] {
            let mut history = SubmissionHistory::default();
            let (mut resources, image) = setup();
            let fb = vk::Framebuffer::from_raw(1);
            let mut out = Findings::new();
            history.replay(
                &[
                    Deferred::DirectClear(image),
                    pass(fb, binding(image, load_op, STORE)),
                ],
                &mut resources,
                &mut out,
            );
            let expected: Vec<_> = expected.into_iter().collect();
            assert_eq!(codes(&out), expected, "{load_op:?}");
        }
    }

    #[test]
    fn unknown_images_are_skipped() {
        let mut history = SubmissionHistory::default();
        let mut resources = ResourceTable::default();
        let ghost = vk::Image::from_raw(0x42);
        let fb = vk::Framebuffer::from_raw(1);
        let mut out = Findings::new();
        history.replay(
            &[
                Deferred::DirectClear(ghost),
                pass(fb, binding(ghost, LOAD, STORE)),
                Deferred::Write(ghost),
            ],
            &mut resources,
            &mut out,
        );
        assert!(out.is_empty());
    }
}
