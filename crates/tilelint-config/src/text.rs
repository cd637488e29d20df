// SPDX-License-Identifier: CEPL-1.0
//! The line-oriented config format:
//!
//! ```text
//! # This is a comment
//! maxSmallIndexedDrawcalls 666
//!
//! # This is another comment
//! smallIndexedDrawcallIndices 667
//! ```
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tilelint_core::MessageCode;
use tracing::{debug, warn};

use crate::{Config, ConfigError, Thresholds};

/// Declares every threshold option once: its field, its file name, and the
/// description written above it by `dump`.
macro_rules! threshold_options {
    ($($field:ident = $name:literal, $doc:literal;)*) => {
        /// Returns `Ok(false)` when `name` is not a threshold option.
        fn set_threshold(
            t: &mut Thresholds,
            name: &str,
            value: &str,
        ) -> Result<bool, ConfigError> {
            match name {
                $($name => t.$field = OptionValue::parse_option(name, value)?,)*
                _ => return Ok(false),
            }
            Ok(true)
        }

        fn dump_thresholds(t: &Thresholds, out: &mut String) {
            $(write_option(out, $name, $doc, &t.$field.render());)*
        }
    };
}

threshold_options! {
    max_small_indexed_drawcalls = "maxSmallIndexedDrawcalls",
        "How many small indexed drawcalls in a command buffer before a warning is thrown";
    small_indexed_drawcall_indices = "smallIndexedDrawcallIndices",
        "How many indices make a small indexed drawcall";
    depth_pre_pass_min_vertices = "depthPrePassMinVertices",
        "Minimum number of vertices to take into account when doing depth pre-pass checks";
    depth_pre_pass_min_indices = "depthPrePassMinIndices",
        "Minimum number of indices to take into account when doing depth pre-pass checks";
    depth_pre_pass_num_draw_calls = "depthPrePassNumDrawCalls",
        "Minimum number of drawcalls in order to trigger depth pre-pass";
    min_device_allocation_size = "minDeviceAllocationSize",
        "Recommended allocation size for vkAllocateMemory";
    min_dedicated_allocation_size = "minDedicatedAllocationSize",
        "Minimum size of a VkDeviceMemory consumed entirely by one image or buffer";
    max_efficient_samples = "maxEfficientSamples",
        "Maximum sample count for full throughput";
    unclamped_max_lod = "unclampedMaxLod",
        "The minimum LOD level which is equivalent to unclamped maxLod";
    index_buffer_scan_min_index_count = "indexBufferScanMinIndexCount",
        "Skip index buffer scanning of drawcalls with less than this limit";
    index_buffer_utilization_threshold = "indexBufferUtilizationThreshold",
        "Only report index buffer fragmentation if utilization is below this threshold";
    index_buffer_cache_hit_threshold = "indexBufferCacheHitThreshold",
        "Only report cache hit performance warnings if cache hit is below this threshold";
    index_buffer_vertex_post_transform_cache = "indexBufferVertexPostTransformCache",
        "Size of post-transform cache used for estimating index buffer cache hit-rate";
    max_instanced_vertex_buffers = "maxInstancedVertexBuffers",
        "Maximum number of instanced vertex buffers which should be used";
    thread_group_size = "threadGroupSize",
        "Number of compute threads dispatched together";
    max_efficient_work_group_threads = "maxEfficientWorkGroupThreads",
        "Maximum number of threads in a workgroup that uses thread group barriers efficiently";
    min_query_count = "minQueryCount",
        "Minimum number of queries that should be operated on at once";
    index_buffer_scanning_enable = "indexBufferScanningEnable",
        "Scan index buffers for inefficiencies on every draw call";
    index_buffer_scanning_in_place = "indexBufferScanningInPlace",
        "Scan index buffers in vkCmdDrawIndexed instead of vkQueueSubmit";
    logging_filename = "loggingFilename",
        "Where to write diagnostics. Empty logs through tracing.\n\
         Special values: stdout, stderr. Anything else is a file path.";
    max_small_drawcall_vertices = "maxSmallDrawcallVertices",
        "How many vertices make a small drawcall";
    workgroup_size_divisor = "workgroupSizeDivisor",
        "Workgroup sizes are optimal when they are a multiple of this";
}

/// A line that was skipped while parsing.
#[derive(Debug)]
pub struct LineIssue {
    /// 1-based line number.
    pub line: usize,
    pub text: String,
    pub error: ConfigError,
}

impl Config {
    /// Parses the line format, skipping anything malformed.
    pub fn parse(text: &str) -> Self {
        Self::parse_with_report(text).0
    }

    pub fn parse_with_report(text: &str) -> (Self, Vec<LineIssue>) {
        let mut cfg = Config::default();
        let mut issues = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            match cfg.apply_line(raw) {
                Ok(()) => {}
                Err(ConfigError::UnknownOption(name)) => {
                    debug!("config line {}: ignoring unknown option `{name}`", i + 1);
                }
                Err(error) => {
                    warn!("config line {}: {error}; line skipped", i + 1);
                    issues.push(LineIssue {
                        line: i + 1,
                        text: raw.to_owned(),
                        error,
                    });
                }
            }
        }
        (cfg, issues)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Applies one `name value` line. Comments and blank lines are accepted as no-ops.
    pub fn apply_line(&mut self, line: &str) -> Result<(), ConfigError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let (name, value) = match line.split_once(char::is_whitespace) {
            Some((name, value)) => (name, unquote(value.trim())),
            None => (line, ""),
        };
        self.set_option(name, value)
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        if set_threshold(&mut self.thresholds, name, value)? {
            return Ok(());
        }
        let code = MessageCode::from_toggle_name(name)
            .ok_or_else(|| ConfigError::UnknownOption(name.to_owned()))?;
        self.messages.set(code, bool::parse_option(name, value)?);
        Ok(())
    }

    /// Every known option as `name value`, each preceded by its description.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_thresholds(&self.thresholds, &mut out);
        for (code, on) in self.messages.iter() {
            let description = format!("Toggle MESSAGE_CODE_{}", code.name());
            write_option(&mut out, code.toggle_name(), &description, &on.render());
        }
        out
    }

    pub fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.dump()).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_option(out: &mut String, name: &str, description: &str, value: &str) {
    for line in description.lines() {
        let _ = writeln!(out, "# {}", line.trim());
    }
    let _ = writeln!(out, "{name} {value}\n");
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

trait OptionValue: Sized {
    fn parse_option(name: &str, value: &str) -> Result<Self, ConfigError>;
    fn render(&self) -> String;
}

fn parse_number<T: FromStr>(
    name: &str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::MissingValue(name.to_owned()));
    }
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_owned(),
        value: value.to_owned(),
        expected,
    })
}

impl OptionValue for u64 {
    fn parse_option(name: &str, value: &str) -> Result<Self, ConfigError> {
        parse_number(name, value, "an unsigned integer")
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for f64 {
    fn parse_option(name: &str, value: &str) -> Result<Self, ConfigError> {
        parse_number(name, value, "a number")
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for bool {
    fn parse_option(name: &str, value: &str) -> Result<Self, ConfigError> {
        match value {
            "" => Err(ConfigError::MissingValue(name.to_owned())),
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_owned(),
                value: value.to_owned(),
                expected: "a boolean",
            }),
        }
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

impl OptionValue for String {
    fn parse_option(_name: &str, value: &str) -> Result<Self, ConfigError> {
        Ok(value.to_owned())
    }

    fn render(&self) -> String {
        format!("\"{self}\"")
    }
}
