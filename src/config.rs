use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::CaptureError;
use crate::target::TargetKind;

const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;
const DEFAULT_THR_QUALITY: f32 = 0.9;
const DEFAULT_THR_QUALITY_HIGH: f32 = 0.99;
const DEFAULT_MISS_TIME_LIMIT: u32 = 40;
const DEFAULT_FAST_INTERVAL: u64 = 100;
const DEFAULT_FAST_CAPTURE_CAP: u32 = 3;
const DEFAULT_CYCLE_INTERVAL: u64 = 20;
const DEFAULT_UPDATE_STEP: f32 = 0.1;

// -------------------- Capture Mode --------------------

/// How aggressively a target's snapshot is refreshed and finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Keep the best snapshot, emit once it has been held for `fast_interval`.
    #[default]
    Auto,
    /// Emit every `fast_interval` ticks, at most `fast_capture_cap` times.
    Fast,
    /// Emit every `cycle_interval` ticks for the target's whole lifetime.
    Cycle,
}

impl FromStr for CaptureMode {
    type Err = CaptureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CaptureMode::Auto),
            "fast" => Ok(CaptureMode::Fast),
            "cycle" => Ok(CaptureMode::Cycle),
            other => Err(CaptureError::invalid(format!(
                "unsupported capture mode '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<u32> for CaptureMode {
    type Error = CaptureError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CaptureMode::Auto),
            1 => Ok(CaptureMode::Fast),
            2 => Ok(CaptureMode::Cycle),
            other => Err(CaptureError::invalid(format!(
                "unsupported capture mode value {}",
                other
            ))),
        }
    }
}

// -------------------- Capture Thresholds --------------------

/// Thresholds driving the per-slot mode policy.
///
/// Intervals and limits are in ticks (processed frames), never wall time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum quality for a snapshot to be stored as "good".
    pub thr_quality: f32,
    /// AUTO stops refreshing once the stored quality reaches this.
    pub thr_quality_high: f32,
    /// Ticks an unmatched target survives before eviction.
    pub miss_time_limit: u32,
    /// Extra ticks added to `miss_time_limit`.
    pub miss_grace: u32,
    pub fast_interval: u64,
    pub fast_capture_cap: u32,
    pub cycle_interval: u64,
    /// Minimum quality gain that justifies overwriting a stored crop.
    pub update_step: f32,
    /// AUTO: stop refreshing after this many ticks and emit once more; 0 disables.
    pub auto_time_limit: u64,
    /// AUTO: emit the first snapshot once it is `fast_interval` ticks old.
    pub auto_fast_capture: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            thr_quality: DEFAULT_THR_QUALITY,
            thr_quality_high: DEFAULT_THR_QUALITY_HIGH,
            miss_time_limit: DEFAULT_MISS_TIME_LIMIT,
            miss_grace: 0,
            fast_interval: DEFAULT_FAST_INTERVAL,
            fast_capture_cap: DEFAULT_FAST_CAPTURE_CAP,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            update_step: DEFAULT_UPDATE_STEP,
            auto_time_limit: 0,
            auto_fast_capture: true,
        }
    }
}

impl CaptureConfig {
    /// Defaults with the update step of `kind`.
    pub fn for_kind<K: TargetKind>(kind: &K) -> Self {
        Self {
            update_step: kind.update_step(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        for (name, value) in [
            ("thr_quality", self.thr_quality),
            ("thr_quality_high", self.thr_quality_high),
            ("update_step", self.update_step),
        ] {
            if !value.is_finite() {
                return Err(CaptureError::invalid(format!("{} must be finite", name)));
            }
        }
        if !(0.0..=1.0).contains(&self.thr_quality) {
            return Err(CaptureError::invalid("thr_quality must be within [0, 1]"));
        }
        if self.thr_quality_high < self.thr_quality || self.thr_quality_high > 1.0 {
            return Err(CaptureError::invalid(
                "thr_quality_high must be within [thr_quality, 1]",
            ));
        }
        if self.update_step < 0.0 {
            return Err(CaptureError::invalid("update_step must be >= 0"));
        }
        if self.fast_interval == 0 {
            return Err(CaptureError::invalid("fast_interval must be > 0"));
        }
        if self.cycle_interval == 0 {
            return Err(CaptureError::invalid("cycle_interval must be > 0"));
        }
        if self.fast_capture_cap == 0 {
            return Err(CaptureError::invalid("fast_capture_cap must be > 0"));
        }
        Ok(())
    }

    /// Miss count above which an alive slot is evicted.
    pub fn eviction_threshold(&self) -> u32 {
        self.miss_time_limit.saturating_add(self.miss_grace)
    }
}

// -------------------- Engine Settings --------------------

#[derive(Debug, Deserialize, Default)]
struct EngineSettingsFile {
    pool_size: Option<usize>,
    memory_limit: Option<usize>,
    mode: Option<CaptureMode>,
    store_rgb: Option<bool>,
    capture: Option<CaptureConfig>,
}

/// Everything needed to construct a `CaptureEngine`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub pool_size: usize,
    pub memory_limit: usize,
    pub mode: CaptureMode,
    /// Convert NV12 crops to RGB before storing.
    pub store_rgb: bool,
    pub capture: CaptureConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            mode: CaptureMode::default(),
            store_rgb: false,
            capture: CaptureConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Load from `$CAPTURE_CONFIG` (JSON, or TOML by extension), then apply
    /// `CAPTURE_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAPTURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineSettingsFile) -> Self {
        let defaults = Self::default();
        Self {
            pool_size: file.pool_size.unwrap_or(defaults.pool_size),
            memory_limit: file.memory_limit.unwrap_or(defaults.memory_limit),
            mode: file.mode.unwrap_or(defaults.mode),
            store_rgb: file.store_rgb.unwrap_or(defaults.store_rgb),
            capture: file.capture.unwrap_or(defaults.capture),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("CAPTURE_MODE") {
            if !mode.trim().is_empty() {
                self.mode = mode
                    .parse()
                    .map_err(|e| anyhow!("CAPTURE_MODE: {}", e))?;
            }
        }
        if let Some(size) = parse_env::<usize>("CAPTURE_POOL_SIZE")? {
            self.pool_size = size;
        }
        if let Some(limit) = parse_env::<usize>("CAPTURE_MEMORY_LIMIT")? {
            self.memory_limit = limit;
        }
        if let Some(thr) = parse_env::<f32>("CAPTURE_THR_QUALITY")? {
            self.capture.thr_quality = thr;
        }
        if let Some(limit) = parse_env::<u32>("CAPTURE_MISS_TIME_LIMIT")? {
            self.capture.miss_time_limit = limit;
        }
        if let Some(store_rgb) = parse_env::<bool>("CAPTURE_STORE_RGB")? {
            self.store_rgb = store_rgb;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CaptureError::invalid("pool_size must be greater than zero").into());
        }
        if self.memory_limit == 0 {
            return Err(CaptureError::invalid("memory_limit must be greater than zero").into());
        }
        self.capture.validate()?;
        Ok(())
    }

    /// One-line description for startup logs.
    pub fn summary(&self) -> String {
        let c = &self.capture;
        format!(
            "mode={:?} pool={} mem_limit={}B thr_quality={:.2} thr_high={:.2} miss_limit={}+{} \
             fast={}x{} cycle={} step={:.2} auto_limit={} auto_fast={} store_rgb={}",
            self.mode,
            self.pool_size,
            self.memory_limit,
            c.thr_quality,
            c.thr_quality_high,
            c.miss_time_limit,
            c.miss_grace,
            c.fast_interval,
            c.fast_capture_cap,
            c.cycle_interval,
            c.update_step,
            c.auto_time_limit,
            c.auto_fast_capture,
            self.store_rgb
        )
    }
}

fn read_config_file(path: &Path) -> Result<EngineSettingsFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, value)),
        _ => Ok(None),
    }
}
