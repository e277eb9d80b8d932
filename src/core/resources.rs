//! Advisory resource structures and chunking configuration.
//!
//! These are forwarded to backends and consumed by the selection policy; the
//! engine never reserves or negotiates resources on its own.

use serde::{Deserialize, Serialize};

/// Resource requirements declared on a task or step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// GPU type hint (e.g. "T4", "A10G", "A100").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,

    /// VRAM requirement in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vram: Option<u64>,

    /// RAM requirement in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<u64>,

    /// CPU core hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    /// Timeout hint in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl ResourceRequirements {
    /// Creates empty requirements.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the GPU type.
    #[must_use]
    pub fn with_gpu(mut self, gpu: impl Into<String>) -> Self {
        self.gpu = Some(gpu.into());
        self
    }

    /// Sets the timeout hint in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Returns true if a GPU is required.
    #[must_use]
    pub fn needs_gpu(&self) -> bool {
        self.gpu.is_some()
    }
}

/// A single GPU reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuInfo {
    /// GPU model name.
    pub name: String,
    /// VRAM in megabytes.
    pub vram: u64,
    /// Whether the GPU is currently free.
    pub available: bool,
}

/// A memory pool reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPool {
    /// Total megabytes.
    pub total: u64,
    /// Currently available megabytes.
    pub available: u64,
}

/// Resources reported by a backend via `get_resources`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// GPUs on the backend.
    #[serde(default)]
    pub gpus: Vec<GpuInfo>,
    /// System RAM.
    #[serde(default)]
    pub ram: MemoryPool,
    /// Aggregate VRAM.
    #[serde(default)]
    pub vram: MemoryPool,
}

impl ResourcePool {
    /// Returns true if at least one GPU is free.
    #[must_use]
    pub fn has_available_gpu(&self) -> bool {
        self.gpus.iter().any(|g| g.available)
    }
}

/// How chunked results are re-assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Concatenate chunk results (arrays are flattened).
    #[default]
    Concat,
    /// Merge the `segments` arrays of each chunk result.
    ConcatSegments,
    /// Collect chunk results into a plain array.
    Aggregate,
}

/// Configuration for splitting a long-running task into windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkConfig {
    /// The payload field containing the input to chunk (e.g. "audio_path").
    pub input_field: String,

    /// Chunk size as a duration string (e.g. "90s", "10m", "1h").
    pub default_size: String,

    /// Overlap between consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: String,

    /// How chunk results are merged.
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

fn default_overlap() -> String {
    "0s".to_string()
}

impl ChunkConfig {
    /// Creates a config with the given input field and chunk size.
    #[must_use]
    pub fn new(input_field: impl Into<String>, default_size: impl Into<String>) -> Self {
        Self {
            input_field: input_field.into(),
            default_size: default_size.into(),
            overlap: default_overlap(),
            merge_strategy: MergeStrategy::default(),
        }
    }

    /// Sets the overlap.
    #[must_use]
    pub fn with_overlap(mut self, overlap: impl Into<String>) -> Self {
        self.overlap = overlap.into();
        self
    }

    /// Sets the merge strategy.
    #[must_use]
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Chunk size in seconds, or `None` if the duration string is invalid.
    #[must_use]
    pub fn size_seconds(&self) -> Option<f64> {
        parse_duration_secs(&self.default_size)
    }

    /// Overlap in seconds, defaulting to zero when invalid.
    #[must_use]
    pub fn overlap_seconds(&self) -> f64 {
        parse_duration_secs(&self.overlap).unwrap_or(0.0)
    }
}

/// Parses a duration string like "30s", "10m" or "1h" into seconds.
#[must_use]
pub fn parse_duration_secs(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || !s.is_ascii() {
        return None;
    }
    let (value, unit) = s.split_at(s.len() - 1);
    let value: f64 = value.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    match unit {
        "s" => Some(value),
        "m" => Some(value * 60.0),
        "h" => Some(value * 3600.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration_secs("30s"), Some(30.0));
        assert_eq!(parse_duration_secs("10m"), Some(600.0));
        assert_eq!(parse_duration_secs("1h"), Some(3600.0));
        assert_eq!(parse_duration_secs("2.5m"), Some(150.0));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration_secs(""), None);
        assert_eq!(parse_duration_secs("10"), None);
        assert_eq!(parse_duration_secs("abc"), None);
        assert_eq!(parse_duration_secs("-5s"), None);
    }

    #[test]
    fn test_chunk_config_defaults() {
        let config = ChunkConfig::new("audio_path", "10m");
        assert_eq!(config.overlap, "0s");
        assert_eq!(config.merge_strategy, MergeStrategy::Concat);
        assert_eq!(config.size_seconds(), Some(600.0));
        assert_eq!(config.overlap_seconds(), 0.0);
    }

    #[test]
    fn test_chunk_config_deserializes_camel_case() {
        let config: ChunkConfig = serde_json::from_value(serde_json::json!({
            "inputField": "video_path",
            "defaultSize": "5m",
            "overlap": "5s",
            "mergeStrategy": "concat_segments",
        }))
        .unwrap();
        assert_eq!(config.input_field, "video_path");
        assert_eq!(config.merge_strategy, MergeStrategy::ConcatSegments);
        assert_eq!(config.overlap_seconds(), 5.0);
    }

    #[test]
    fn test_resource_pool_gpu_availability() {
        let pool = ResourcePool {
            gpus: vec![
                GpuInfo {
                    name: "T4".to_string(),
                    vram: 16384,
                    available: false,
                },
                GpuInfo {
                    name: "A10G".to_string(),
                    vram: 24576,
                    available: true,
                },
            ],
            ..ResourcePool::default()
        };
        assert!(pool.has_available_gpu());
    }

    #[test]
    fn test_requirements_gpu_flag() {
        assert!(!ResourceRequirements::new().needs_gpu());
        assert!(ResourceRequirements::new().with_gpu("A100").needs_gpu());
    }
}
