use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::hand::Finger;
use crate::tracker::Thresholds;

/// 設定の検証・適用エラー
///
/// 拒否された設定は一切反映されず、直前の有効な設定が残る。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{section}: low threshold {low} must be below high threshold {high}")]
    ThresholdOrder {
        section: &'static str,
        low: f32,
        high: f32,
    },
    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f32 },
    #[error("roi.min_size {min} exceeds roi.max_size {max}")]
    RoiSizeOrder { min: f32, max: f32 },
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
    #[error("unknown setting {section}.{key}")]
    UnknownSetting { section: String, key: String },
    #[error("cannot parse {value:?} for {section}.{key}")]
    Parse {
        section: String,
        key: String,
        value: String,
    },
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    // NaN も拒否する
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

/// 設定ファイル全体 (hand_tracker.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(flatten)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// ワーカーに積めるフレーム数。溢れたフレームは破棄される
    #[serde(default = "default_frame_queue")]
    pub frame_queue: usize,
}

fn default_listen_addr() -> String { "0.0.0.0:9100".to_string() }
fn default_frame_queue() -> usize { 8 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            frame_queue: default_frame_queue(),
        }
    }
}

/// パイプラインが参照する設定一式
///
/// フレーム処理中は不変。更新は `apply_setting` / `HandTracker::update_config`
/// 経由でフレーム間にのみ行われる。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub hands: HandsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fingers: FingersConfig,
    #[serde(default)]
    pub pinch: PinchConfig,
    #[serde(default)]
    pub roi: RoiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandsConfig {
    /// 同時に追跡する手のスロット数
    #[serde(default = "default_max_hands")]
    pub max_hands: usize,
}

fn default_max_hands() -> usize { 2 }

impl Default for HandsConfig {
    fn default() -> Self {
        Self { max_hands: default_max_hands() }
    }
}

/// One Euro フィルタのパラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// 最小カットオフ周波数 (Hz)。低いほど静止時に滑らか
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    /// 速度係数。高いほど速い動きでの遅延が減る
    #[serde(default = "default_beta")]
    pub beta: f32,
    /// 微分用カットオフ周波数 (Hz)
    #[serde(default = "default_derivative_cutoff")]
    pub derivative_cutoff: f32,
}

fn default_min_cutoff() -> f32 { 2.0 }
fn default_beta() -> f32 { 0.01 }
fn default_derivative_cutoff() -> f32 { 1.0 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            derivative_cutoff: default_derivative_cutoff(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("filter.min_cutoff", self.min_cutoff)?;
        non_negative("filter.beta", self.beta)?;
        positive("filter.derivative_cutoff", self.derivative_cutoff)?;
        Ok(())
    }
}

/// 指ごとの有効フラグと屈曲ヒステリシス閾値
///
/// 閾値は屈曲角（0° = まっすぐ、大きいほど曲がっている）で表す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingersConfig {
    #[serde(default = "default_true")]
    pub thumb: bool,
    #[serde(default = "default_true")]
    pub index: bool,
    #[serde(default = "default_true")]
    pub middle: bool,
    #[serde(default = "default_true")]
    pub ring: bool,
    #[serde(default = "default_true")]
    pub pinky: bool,
    /// これ未満なら straight
    #[serde(default = "default_straight_threshold")]
    pub straight_threshold: f32,
    /// これを超えたら bent
    #[serde(default = "default_bent_threshold")]
    pub bent_threshold: f32,
    #[serde(default = "default_stable_frames")]
    pub stable_frames: u32,
}

fn default_true() -> bool { true }
fn default_straight_threshold() -> f32 { 30.0 }
fn default_bent_threshold() -> f32 { 60.0 }
fn default_stable_frames() -> u32 { 3 }

impl Default for FingersConfig {
    fn default() -> Self {
        Self {
            thumb: true,
            index: true,
            middle: true,
            ring: true,
            pinky: true,
            straight_threshold: default_straight_threshold(),
            bent_threshold: default_bent_threshold(),
            stable_frames: default_stable_frames(),
        }
    }
}

impl FingersConfig {
    pub fn is_enabled(&self, finger: Finger) -> bool {
        match finger {
            Finger::Thumb => self.thumb,
            Finger::Index => self.index,
            Finger::Middle => self.middle,
            Finger::Ring => self.ring,
            Finger::Pinky => self.pinky,
        }
    }

    pub fn set_enabled(&mut self, finger: Finger, enabled: bool) {
        let flag = match finger {
            Finger::Thumb => &mut self.thumb,
            Finger::Index => &mut self.index,
            Finger::Middle => &mut self.middle,
            Finger::Ring => &mut self.ring,
            Finger::Pinky => &mut self.pinky,
        };
        *flag = enabled;
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(
            "fingers",
            self.straight_threshold,
            self.bent_threshold,
            self.stable_frames,
        )
    }
}

/// ピンチ判定（親指先端と人差し指先端の正規化距離）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinchConfig {
    /// これ未満でピンチ開始
    #[serde(default = "default_pinch_threshold")]
    pub threshold: f32,
    /// これを超えたらピンチ解除
    #[serde(default = "default_release_threshold")]
    pub release_threshold: f32,
    #[serde(default = "default_stable_frames")]
    pub stable_frames: u32,
}

fn default_pinch_threshold() -> f32 { 0.05 }
fn default_release_threshold() -> f32 { 0.07 }

impl Default for PinchConfig {
    fn default() -> Self {
        Self {
            threshold: default_pinch_threshold(),
            release_threshold: default_release_threshold(),
            stable_frames: default_stable_frames(),
        }
    }
}

impl PinchConfig {
    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(
            "pinch",
            self.threshold,
            self.release_threshold,
            self.stable_frames,
        )
    }
}

/// ROI トラッカー（正規化座標）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    /// 領域の最小辺長
    #[serde(default = "default_roi_min_size")]
    pub min_size: f32,
    /// 領域の最大辺長
    #[serde(default = "default_roi_max_size")]
    pub max_size: f32,
    /// 重心から領域端までに確保する余白
    #[serde(default = "default_roi_margin")]
    pub margin: f32,
    /// 速度 (正規化座標/秒) あたりの半径拡大量
    #[serde(default = "default_velocity_multiplier")]
    pub velocity_multiplier: f32,
    /// 速度推定の EMA 係数 (0, 1]
    #[serde(default = "default_velocity_smoothing")]
    pub velocity_smoothing: f32,
    /// 前回フル処理時からの予測移動量がこれ以上ならフル処理
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,
    /// フル処理の最大間隔（ミリ秒）
    #[serde(default = "default_max_time_between_full_frames_ms")]
    pub max_time_between_full_frames_ms: f64,
}

fn default_roi_min_size() -> f32 { 0.2 }
fn default_roi_max_size() -> f32 { 0.8 }
fn default_roi_margin() -> f32 { 0.05 }
fn default_velocity_multiplier() -> f32 { 0.5 }
fn default_velocity_smoothing() -> f32 { 0.5 }
fn default_movement_threshold() -> f32 { 0.1 }
fn default_max_time_between_full_frames_ms() -> f64 { 1000.0 }

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            min_size: default_roi_min_size(),
            max_size: default_roi_max_size(),
            margin: default_roi_margin(),
            velocity_multiplier: default_velocity_multiplier(),
            velocity_smoothing: default_velocity_smoothing(),
            movement_threshold: default_movement_threshold(),
            max_time_between_full_frames_ms: default_max_time_between_full_frames_ms(),
        }
    }
}

impl RoiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("roi.min_size", self.min_size)?;
        positive("roi.max_size", self.max_size)?;
        if self.min_size > self.max_size {
            return Err(ConfigError::RoiSizeOrder {
                min: self.min_size,
                max: self.max_size,
            });
        }
        non_negative("roi.margin", self.margin)?;
        if self.margin >= self.min_size / 2.0 {
            return Err(ConfigError::OutOfRange {
                field: "roi.margin",
                reason: format!(
                    "{} must be smaller than half of roi.min_size ({})",
                    self.margin, self.min_size
                ),
            });
        }
        non_negative("roi.velocity_multiplier", self.velocity_multiplier)?;
        positive("roi.velocity_smoothing", self.velocity_smoothing)?;
        if self.velocity_smoothing > 1.0 {
            return Err(ConfigError::OutOfRange {
                field: "roi.velocity_smoothing",
                reason: format!("{} is above 1.0", self.velocity_smoothing),
            });
        }
        positive("roi.movement_threshold", self.movement_threshold)?;
        positive(
            "roi.max_time_between_full_frames_ms",
            self.max_time_between_full_frames_ms as f32,
        )?;
        Ok(())
    }
}

impl TrackingConfig {
    /// 全項目を検証する。1つでも不正なら最初のエラーを返す
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hands.max_hands == 0 {
            return Err(ConfigError::OutOfRange {
                field: "hands.max_hands",
                reason: "at least one hand slot is required".to_string(),
            });
        }
        self.filter.validate()?;
        self.fingers.thresholds()?;
        self.pinch.thresholds()?;
        self.roi.validate()?;
        Ok(())
    }

    /// `section.key = value` 形式の設定変更を適用する
    ///
    /// コピーに書き込んで検証し、成功したときだけ置き換える。
    pub fn apply_setting(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        next.write_setting(section, key, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn write_setting(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let parse_err = || ConfigError::Parse {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        };
        let f32_value = || value.trim().parse::<f32>().map_err(|_| parse_err());
        let u32_value = || value.trim().parse::<u32>().map_err(|_| parse_err());
        let bool_value = || parse_bool(value).ok_or_else(parse_err);

        match (section, key) {
            ("hands", "max_hands") => {
                self.hands.max_hands = value.trim().parse::<usize>().map_err(|_| parse_err())?;
            }
            ("filter", "min_cutoff") => self.filter.min_cutoff = f32_value()?,
            ("filter", "beta") => self.filter.beta = f32_value()?,
            ("filter", "derivative_cutoff") => self.filter.derivative_cutoff = f32_value()?,
            ("fingers", "straight_threshold") => self.fingers.straight_threshold = f32_value()?,
            ("fingers", "bent_threshold") => self.fingers.bent_threshold = f32_value()?,
            ("fingers", "stable_frames") => self.fingers.stable_frames = u32_value()?,
            ("fingers", name) if Finger::from_name(name).is_some() => {
                let enabled = bool_value()?;
                if let Some(finger) = Finger::from_name(name) {
                    self.fingers.set_enabled(finger, enabled);
                }
            }
            ("pinch", "threshold") => self.pinch.threshold = f32_value()?,
            ("pinch", "release_threshold") => self.pinch.release_threshold = f32_value()?,
            ("pinch", "stable_frames") => self.pinch.stable_frames = u32_value()?,
            ("roi", "min_size") => self.roi.min_size = f32_value()?,
            ("roi", "max_size") => self.roi.max_size = f32_value()?,
            ("roi", "margin") => self.roi.margin = f32_value()?,
            ("roi", "velocity_multiplier") => self.roi.velocity_multiplier = f32_value()?,
            ("roi", "velocity_smoothing") => self.roi.velocity_smoothing = f32_value()?,
            ("roi", "movement_threshold") => self.roi.movement_threshold = f32_value()?,
            ("roi", "max_time_between_full_frames_ms") => {
                self.roi.max_time_between_full_frames_ms =
                    value.trim().parse::<f64>().map_err(|_| parse_err())?;
            }
            _ => {
                return Err(ConfigError::UnknownSetting {
                    section: section.to_string(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.tracking.validate()?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト設定で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %path.as_ref().display(),
                    "using default config: {:#}",
                    e
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.min_cutoff, 2.0);
        assert_eq!(config.filter.beta, 0.01);
        assert_eq!(config.pinch.threshold, 0.05);
        assert_eq!(config.pinch.release_threshold, 0.07);
    }

    #[test]
    fn test_parse_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "127.0.0.1:9999"

            [filter]
            beta = 0.5

            [fingers]
            pinky = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.server.frame_queue, 8);
        assert_eq!(config.tracking.filter.beta, 0.5);
        assert_eq!(config.tracking.filter.min_cutoff, 2.0);
        assert!(!config.tracking.fingers.pinky);
        assert!(config.tracking.fingers.thumb);
        assert_eq!(config.tracking.roi, RoiConfig::default());
    }

    #[test]
    fn test_apply_setting_commits_valid_value() {
        let mut config = TrackingConfig::default();
        config.apply_setting("filter", "beta", "0.2").unwrap();
        assert_eq!(config.filter.beta, 0.2);
        config.apply_setting("fingers", "ring", "off").unwrap();
        assert!(!config.fingers.ring);
        config.apply_setting("roi", "max_time_between_full_frames_ms", "500").unwrap();
        assert_eq!(config.roi.max_time_between_full_frames_ms, 500.0);
    }

    #[test]
    fn test_apply_setting_rejects_inverted_thresholds() {
        let mut config = TrackingConfig::default();
        let before = config.clone();
        let err = config.apply_setting("pinch", "threshold", "0.09").unwrap_err();
        assert!(matches!(err, ConfigError::ThresholdOrder { section: "pinch", .. }));
        // 直前の設定が残る
        assert_eq!(config, before);
    }

    #[test]
    fn test_apply_setting_rejects_non_positive_cutoff() {
        let mut config = TrackingConfig::default();
        let err = config.apply_setting("filter", "min_cutoff", "0").unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive { field: "filter.min_cutoff", value: 0.0 }
        );
        assert!(config.apply_setting("filter", "min_cutoff", "NaN").is_err());
        assert_eq!(config.filter.min_cutoff, 2.0);
    }

    #[test]
    fn test_apply_setting_rejects_roi_size_order() {
        let mut config = TrackingConfig::default();
        let err = config.apply_setting("roi", "min_size", "0.9").unwrap_err();
        assert!(matches!(err, ConfigError::RoiSizeOrder { .. }));
        assert_eq!(config.roi.min_size, 0.2);
    }

    #[test]
    fn test_apply_setting_unknown_and_unparsable() {
        let mut config = TrackingConfig::default();
        assert!(matches!(
            config.apply_setting("filter", "gamma", "1.0"),
            Err(ConfigError::UnknownSetting { .. })
        ));
        assert!(matches!(
            config.apply_setting("pinch", "stable_frames", "three"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            config.apply_setting("fingers", "index", "maybe"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_stable_frames_rejected() {
        let mut config = TrackingConfig::default();
        assert!(config.apply_setting("fingers", "stable_frames", "0").is_err());
        assert_eq!(config.fingers.stable_frames, 3);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.server.listen_addr, "0.0.0.0:9100");
        assert_eq!(config.tracking, TrackingConfig::default());
    }
}
