// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Performance heuristics for tile-based GPUs, driven by a decoded Vulkan
//! call stream.

mod engine;
pub mod formats;
pub mod history;
mod layer;
pub mod recording;
mod reporter;
pub mod resources;
mod rules;
mod sink;

pub use engine::Engine;
pub use formats::FbcdcTable;
pub use layer::Layer;
pub use reporter::Reporter;
pub use sink::{open_sink, MemorySink, NullSink, TracingSink, WriterSink};

pub use tilelint_api::{
    BufferDesc, Call, ClearTarget, DescriptorImageWrite, Dispatch, ImageDesc, ImageTransition,
    Message, MessageSink, SamplerDesc, SubpassLayout,
};
pub use tilelint_config::{Config, Thresholds};
pub use tilelint_core::MessageCode;
