use serde::{Deserialize, Serialize};

use crate::config::RoiConfig;
use crate::hand::Landmark;

/// 次フレームで検出器に渡す探索領域（正規化座標、正方形）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiState {
    /// 領域中心 (x, y)
    pub center: [f32; 2],
    /// 中心から辺までの距離
    pub half_size: f32,
    /// 最後にフルフレーム処理を要求した時刻（ミリ秒）
    pub last_full_frame_ms: f64,
}

impl RoiState {
    pub fn size(&self) -> f32 {
        self.half_size * 2.0
    }

    /// 点が各辺から `margin` 以上内側にあるか
    pub fn contains(&self, point: [f32; 2], margin: f32) -> bool {
        let limit = self.half_size - margin;
        (point[0] - self.center[0]).abs() <= limit && (point[1] - self.center[1]).abs() <= limit
    }

    /// フレーム境界でクリップしたクロップ領域
    pub fn to_crop_region(&self) -> CropRegion {
        let x0 = (self.center[0] - self.half_size).max(0.0);
        let y0 = (self.center[1] - self.half_size).max(0.0);
        let x1 = (self.center[0] + self.half_size).min(1.0);
        let y1 = (self.center[1] + self.half_size).min(1.0);
        CropRegion {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0.0),
            height: (y1 - y0).max(0.0),
        }
    }
}

/// クロップ領域（正規化座標 0.0〜1.0）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }
}

/// クロップ画像内の正規化座標をフレーム全体の正規化座標に変換
///
/// 検出器ドライバ側で、`RoiState::to_crop_region` の領域で検出した結果を
/// `Frame` に詰める前に使う。z はクロップ幅に合わせてスケールする。
pub fn remap_landmarks(landmarks: &[Landmark], crop: &CropRegion) -> Vec<Landmark> {
    landmarks
        .iter()
        .map(|lm| Landmark {
            x: crop.x + lm.x * crop.width,
            y: crop.y + lm.y * crop.height,
            z: lm.z * crop.width,
        })
        .collect()
}

/// ランドマークの重心と、バウンディングボックスの長辺
fn centroid_and_extent(landmarks: &[Landmark]) -> ([f32; 2], f32) {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    let mut sum = [0.0f32; 2];

    for lm in landmarks {
        min_x = min_x.min(lm.x);
        min_y = min_y.min(lm.y);
        max_x = max_x.max(lm.x);
        max_y = max_y.max(lm.y);
        sum[0] += lm.x;
        sum[1] += lm.y;
    }

    let n = landmarks.len() as f32;
    ([sum[0] / n, sum[1] / n], (max_x - min_x).max(max_y - min_y))
}

/// 手の周辺だけを処理するための予測領域トラッカー
///
/// - 重心速度を EMA で推定し、速いほど領域を広げる
/// - 一定時間ごと、または予測移動量が大きいときはフルフレーム処理を要求
/// - 手を見失ったら速度を捨て、次回はフルフレーム
#[derive(Debug, Clone, Default)]
pub struct RoiTracker {
    /// 前回の重心と時刻（ミリ秒）
    prev: Option<([f32; 2], f64)>,
    /// 重心速度（正規化座標/秒）
    velocity: [f32; 2],
    /// 直近のフレーム間隔（ミリ秒）
    frame_interval_ms: f64,
    last_full_frame_ms: Option<f64>,
    /// フルフレーム処理時の重心
    anchor: Option<[f32; 2]>,
    region: Option<RoiState>,
    lost: bool,
}

impl RoiTracker {
    pub fn new() -> Self {
        Self {
            lost: true,
            ..Self::default()
        }
    }

    /// 今フレームのランドマークで更新し、次フレームをフルフレームで処理すべきかを返す
    pub fn update(&mut self, landmarks: &[Landmark], timestamp_ms: f64, config: &RoiConfig) -> bool {
        let usable: Vec<Landmark> = landmarks.iter().copied().filter(Landmark::is_finite).collect();
        if usable.is_empty() {
            self.mark_lost();
            return true;
        }

        let (centroid, extent) = centroid_and_extent(&usable);

        if let Some((prev, prev_ms)) = self.prev {
            let dt_ms = timestamp_ms - prev_ms;
            if dt_ms > 0.0 {
                let dt = (dt_ms / 1000.0) as f32;
                let a = config.velocity_smoothing;
                for axis in 0..2 {
                    let instant = (centroid[axis] - prev[axis]) / dt;
                    self.velocity[axis] = a * instant + (1.0 - a) * self.velocity[axis];
                }
                self.frame_interval_ms = dt_ms;
            }
        }
        if !(self.velocity[0].is_finite() && self.velocity[1].is_finite()) {
            self.velocity = [0.0; 2];
        }
        self.prev = Some((centroid, timestamp_ms));

        let speed = self.velocity[0].hypot(self.velocity[1]);
        let half_size = (extent / 2.0 + config.margin + config.velocity_multiplier * speed)
            .clamp(config.min_size / 2.0, config.max_size / 2.0);

        // 1フレーム先の予測位置へずらす。重心が余白付きで収まる範囲まで
        let lookahead = (self.frame_interval_ms / 1000.0) as f32;
        let max_offset = (half_size - config.margin).max(0.0);
        let center = [
            centroid[0] + (self.velocity[0] * lookahead).clamp(-max_offset, max_offset),
            centroid[1] + (self.velocity[1] * lookahead).clamp(-max_offset, max_offset),
        ];

        let refresh_due = match self.last_full_frame_ms {
            Some(last) => {
                let since = timestamp_ms - last;
                since < 0.0 || since >= config.max_time_between_full_frames_ms
            }
            None => true,
        };
        let moved = match self.anchor {
            Some(anchor) => {
                (center[0] - anchor[0]).hypot(center[1] - anchor[1]) >= config.movement_threshold
            }
            None => true,
        };

        let full_frame = self.lost || refresh_due || moved;
        self.lost = false;

        if full_frame {
            self.last_full_frame_ms = Some(timestamp_ms);
            self.anchor = Some(centroid);
            self.region = None;
        } else {
            self.region = Some(RoiState {
                center,
                half_size,
                last_full_frame_ms: self.last_full_frame_ms.unwrap_or(timestamp_ms),
            });
        }
        full_frame
    }

    /// 領域限定処理に使う領域。フルフレーム処理を要求中なら `None`
    pub fn region(&self) -> Option<RoiState> {
        self.region
    }

    pub fn velocity(&self) -> [f32; 2] {
        self.velocity
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    fn mark_lost(&mut self) {
        self.lost = true;
        self.prev = None;
        self.velocity = [0.0; 2];
        self.anchor = None;
        self.region = None;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
