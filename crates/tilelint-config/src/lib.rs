// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod text;
mod toggles;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tilelint_core::MessageCode;
use tracing::debug;

pub use error::ConfigError;
pub use text::LineIssue;
pub use toggles::Toggles;

/// Tunable limits consumed by the rule bodies.
///
/// The depth pre-pass, index buffer, instancing and compute options have no
/// rule reading them; they are kept so existing layer config files load and
/// dump unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    pub max_small_indexed_drawcalls: u64,
    pub small_indexed_drawcall_indices: u64,
    pub depth_pre_pass_min_vertices: u64,
    pub depth_pre_pass_min_indices: u64,
    pub depth_pre_pass_num_draw_calls: u64,
    pub min_device_allocation_size: u64,
    /// Lower bound for an allocation consumed whole by one image or buffer.
    pub min_dedicated_allocation_size: u64,
    pub max_efficient_samples: u64,
    pub unclamped_max_lod: f64,
    pub index_buffer_scan_min_index_count: u64,
    pub index_buffer_utilization_threshold: f64,
    pub index_buffer_cache_hit_threshold: f64,
    pub index_buffer_vertex_post_transform_cache: u64,
    pub max_instanced_vertex_buffers: u64,
    pub thread_group_size: u64,
    pub max_efficient_work_group_threads: u64,
    pub min_query_count: u64,
    pub index_buffer_scanning_enable: bool,
    pub index_buffer_scanning_in_place: bool,
    pub logging_filename: String,
    pub max_small_drawcall_vertices: u64,
    pub workgroup_size_divisor: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            max_small_indexed_drawcalls: 10,
            small_indexed_drawcall_indices: 10,
            depth_pre_pass_min_vertices: 1,
            depth_pre_pass_min_indices: 1,
            depth_pre_pass_num_draw_calls: 1,
            min_device_allocation_size: 256 * 1024,
            min_dedicated_allocation_size: 2 * 1024 * 1024,
            max_efficient_samples: 2,
            unclamped_max_lod: 32.0,
            index_buffer_scan_min_index_count: 128,
            index_buffer_utilization_threshold: 0.5,
            index_buffer_cache_hit_threshold: 0.5,
            index_buffer_vertex_post_transform_cache: 32,
            max_instanced_vertex_buffers: 1,
            thread_group_size: 4,
            max_efficient_work_group_threads: 64,
            min_query_count: 10,
            index_buffer_scanning_enable: true,
            index_buffer_scanning_in_place: false,
            logging_filename: String::new(),
            max_small_drawcall_vertices: 10,
            workgroup_size_divisor: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub messages: Toggles,
}

/// On-disk TOML shape: `[thresholds]` plus a `[messages]` table of `msg*` switches.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    thresholds: Thresholds,
    messages: BTreeMap<String, bool>,
}

impl Config {
    pub fn is_enabled(&self, code: MessageCode) -> bool {
        self.messages.is_enabled(code)
    }

    pub fn set_enabled(&mut self, code: MessageCode, on: bool) {
        self.messages.set(code, on);
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        let mut messages = Toggles::default();
        for (name, on) in file.messages {
            match MessageCode::from_toggle_name(&name) {
                Some(code) => messages.set(code, on),
                None => debug!("ignoring unknown message toggle `{name}`"),
            }
        }
        Ok(Config {
            thresholds: file.thresholds,
            messages,
        })
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            thresholds: self.thresholds.clone(),
            messages: self
                .messages
                .iter()
                .map(|(code, on)| (code.toggle_name().to_owned(), on))
                .collect(),
        };
        Ok(toml::to_string(&file)?)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_layer() {
        let cfg = Config::default();
        assert_eq!(cfg.thresholds.max_small_drawcall_vertices, 10);
        assert_eq!(cfg.thresholds.min_query_count, 10);
        assert_eq!(cfg.thresholds.min_device_allocation_size, 262_144);
        assert_eq!(cfg.thresholds.min_dedicated_allocation_size, 2_097_152);
        assert_eq!(cfg.thresholds.unclamped_max_lod, 32.0);
        assert!(cfg.is_enabled(MessageCode::NonIndexedDrawCall));
        assert!(!cfg.is_enabled(MessageCode::SamplerLodClamping));
    }

    #[test]
    fn toml_round_trip() {
        let mut cfg = Config::default();
        cfg.thresholds.min_query_count = 64;
        cfg.thresholds.logging_filename = "stderr".into();
        cfg.set_enabled(MessageCode::PartialClear, false);

        let s = cfg.to_toml_string().unwrap();
        assert!(s.contains("[thresholds]"));
        assert!(s.contains("minQueryCount = 64"));
        assert!(s.contains("msgPartialClear = false"));
        assert_eq!(Config::from_toml_str(&s).unwrap(), cfg);
    }

    #[test]
    fn toml_partial_file_keeps_defaults() {
        let cfg = Config::from_toml_str(
            "[thresholds]\nmaxSmallDrawcallVertices = 64\n\n\
             [messages]\nmsgNoFBCDC = false\nmsgBogus = true\n",
        )
        .unwrap();
        assert_eq!(cfg.thresholds.max_small_drawcall_vertices, 64);
        assert_eq!(cfg.thresholds.min_query_count, 10);
        assert!(!cfg.is_enabled(MessageCode::NoFbcdc));
        assert!(cfg.is_enabled(MessageCode::TileReadback));
    }

    #[test]
    fn toml_type_mismatch_is_an_error() {
        let err = Config::from_toml_str("[thresholds]\nminQueryCount = \"lots\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlDecode(_)));
    }
}
