// SPDX-License-Identifier: CEPL-1.0
use std::io;

use tilelint_api::{Call, Dispatch};
use tilelint_config::Config;

use crate::engine::Engine;
use crate::sink::open_sink;

/// Observes each call, then hands it on to the next link untouched.
pub struct Layer<D> {
    engine: Engine,
    next: D,
}

impl<D: Dispatch> Layer<D> {
    pub fn new(engine: Engine, next: D) -> Self {
        Layer { engine, next }
    }

    /// Builds the engine with the sink named by `loggingFilename`.
    pub fn from_config(config: Config, next: D) -> io::Result<Self> {
        let sink = open_sink(&config)?;
        Ok(Layer::new(Engine::new(config, sink), next))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn next(&self) -> &D {
        &self.next
    }

    pub fn call(&self, call: Call<'_>) {
        self.engine.observe(&call);
        self.next.dispatch(&call);
    }
}
