// SPDX-License-Identifier: CEPL-1.0
mod support;

use std::cell::RefCell;

use ash::vk;
use support::Harness;
use tilelint_engine::{Call, Config, Dispatch, Engine, Layer, MessageCode, NullSink};

fn non_indexed(config: Config, vertex_count: u32) -> u32 {
    let h = Harness::with_config(config);
    let cb = h.begin();
    h.draw(cb, vertex_count);
    h.count(MessageCode::NonIndexedDrawCall)
}

#[test]
fn large_non_indexed_draw_fires_once() {
    assert_eq!(non_indexed(Config::default(), 30), 1);
}

#[test]
fn small_non_indexed_draw_is_fine() {
    assert_eq!(non_indexed(Config::default(), 3), 0);
}

#[test]
fn non_indexed_threshold_boundary() {
    let max = Config::default().thresholds.max_small_drawcall_vertices as u32;
    assert_eq!(non_indexed(Config::default(), max - 1), 0);
    assert_eq!(non_indexed(Config::default(), max), 0);
    assert_eq!(non_indexed(Config::default(), max + 1), 1);
}

#[test]
fn non_indexed_threshold_follows_config() {
    let mut config = Config::default();
    config.thresholds.max_small_drawcall_vertices = 64;
    assert_eq!(non_indexed(config.clone(), 30), 0);
    assert_eq!(non_indexed(config.clone(), 64), 0);
    assert_eq!(non_indexed(config, 65), 1);
}

#[test]
fn indexed_draws_are_not_non_indexed() {
    let h = Harness::new();
    let cb = h.begin();
    h.observe(Call::CmdDrawIndexed {
        command_buffer: cb,
        index_count: 3000,
        instance_count: 1,
    });
    assert_eq!(h.count(MessageCode::NonIndexedDrawCall), 0);
}

#[test]
fn each_draw_is_its_own_event() {
    let h = Harness::new();
    let cb = h.begin();
    for _ in 0..3 {
        h.draw(cb, 300);
    }
    assert_eq!(h.count(MessageCode::NonIndexedDrawCall), 3);
}

#[test]
fn reset_zeroes_counters() {
    let h = Harness::new();
    let cb = h.begin();
    h.draw(cb, 300);
    h.observe(Call::AllocateMemory {
        memory: h.handle(),
        size: 1,
    });
    assert_eq!(h.count(MessageCode::NonIndexedDrawCall), 1);
    h.engine.reset();
    for &code in MessageCode::ALL {
        assert_eq!(h.count(code), 0, "{code}");
    }
    h.draw(cb, 300);
    assert_eq!(h.count(MessageCode::NonIndexedDrawCall), 1);
}

#[test]
fn independent_engines_do_not_share_counters() {
    let a = Harness::new();
    let b = Harness::new();
    let cb = a.begin();
    a.draw(cb, 300);
    assert_eq!(a.count(MessageCode::NonIndexedDrawCall), 1);
    assert_eq!(b.count(MessageCode::NonIndexedDrawCall), 0);
}

fn small_indexed(count: u64) -> u32 {
    let h = Harness::new();
    let cb = h.begin();
    for _ in 0..count {
        h.observe(Call::CmdDrawIndexed {
            command_buffer: cb,
            index_count: 6,
            instance_count: 1,
        });
    }
    // Large draws do not count towards the limit.
    h.observe(Call::CmdDrawIndexed {
        command_buffer: cb,
        index_count: 600,
        instance_count: 1,
    });
    h.observe(Call::EndCommandBuffer { command_buffer: cb });
    h.count(MessageCode::ManySmallIndexedDrawcalls)
}

#[test]
fn many_small_indexed_draws() {
    let max = Config::default().thresholds.max_small_indexed_drawcalls;
    assert_eq!(small_indexed(max), 0);
    assert_eq!(small_indexed(max + 1), 1);
}

#[test]
fn begin_resets_draw_statistics() {
    let h = Harness::new();
    let cb = h.begin();
    for _ in 0..8 {
        h.observe(Call::CmdDrawIndexed {
            command_buffer: cb,
            index_count: 3,
            instance_count: 1,
        });
    }
    h.observe(Call::EndCommandBuffer { command_buffer: cb });
    h.observe(Call::BeginCommandBuffer {
        command_buffer: cb,
        flags: vk::CommandBufferUsageFlags::empty(),
    });
    for _ in 0..8 {
        h.observe(Call::CmdDrawIndexed {
            command_buffer: cb,
            index_count: 3,
            instance_count: 1,
        });
    }
    h.observe(Call::EndCommandBuffer { command_buffer: cb });
    assert_eq!(h.count(MessageCode::ManySmallIndexedDrawcalls), 0);
}

#[derive(Default)]
struct RecordingDriver {
    calls: RefCell<Vec<&'static str>>,
}

impl Dispatch for RecordingDriver {
    fn dispatch(&self, call: &Call<'_>) {
        self.calls.borrow_mut().push(call.name());
    }
}

#[test]
fn layer_observes_then_forwards() {
    let layer = Layer::new(
        Engine::new(Config::default(), Box::new(NullSink)),
        RecordingDriver::default(),
    );
    let command_buffer = vk::Handle::from_raw(1);
    layer.call(Call::BeginCommandBuffer {
        command_buffer,
        flags: vk::CommandBufferUsageFlags::empty(),
    });
    layer.call(Call::CmdDraw {
        command_buffer,
        vertex_count: 300,
        instance_count: 1,
    });
    assert_eq!(layer.engine().count(MessageCode::NonIndexedDrawCall), 1);
    assert_eq!(
        *layer.next().calls.borrow(),
        ["vkBeginCommandBuffer", "vkCmdDraw"]
    );
}

#[test]
fn layer_from_config_uses_named_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("diagnostics.log");
    let mut config = Config::default();
    config.thresholds.logging_filename = path.to_string_lossy().into_owned();
    let layer = Layer::from_config(config, RecordingDriver::default()).unwrap();

    let command_buffer = vk::Handle::from_raw(1);
    layer.call(Call::CmdDraw {
        command_buffer,
        vertex_count: 30,
        instance_count: 1,
    });
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("tilelint [40 NON_INDEXED_DRAW_CALL] "), "{text}");
}
