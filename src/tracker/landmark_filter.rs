use crate::config::FilterConfig;
use crate::hand::{HandLandmark, Landmark};

use super::one_euro::ScalarFilter;

/// 軸ごとに独立した One Euro フィルタ（タイムスタンプは共通）
#[derive(Debug, Clone)]
pub struct VectorFilter<const N: usize> {
    axes: [ScalarFilter; N],
    /// 共有パラメータの代わりに使う個別パラメータ
    override_params: Option<FilterConfig>,
}

impl<const N: usize> VectorFilter<N> {
    pub fn new() -> Self {
        Self {
            axes: std::array::from_fn(|_| ScalarFilter::new()),
            override_params: None,
        }
    }

    pub fn filter(&mut self, values: [f32; N], timestamp: f64, shared: &FilterConfig) -> [f32; N] {
        let params = self.override_params.unwrap_or(*shared);
        let mut out = [0.0; N];
        for (i, axis) in self.axes.iter_mut().enumerate() {
            out[i] = axis.filter(values[i], timestamp, &params);
        }
        out
    }

    pub fn set_override(&mut self, params: Option<FilterConfig>) {
        self.override_params = params;
    }

    pub fn override_params(&self) -> Option<FilterConfig> {
        self.override_params
    }

    pub fn axis(&self, axis: usize) -> Option<&ScalarFilter> {
        self.axes.get(axis)
    }

    /// 状態のみ初期化。個別パラメータは保持する
    pub fn reset(&mut self) {
        for f in &mut self.axes {
            f.reset();
        }
    }
}

impl<const N: usize> Default for VectorFilter<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// 3D ランドマーク用
pub type LandmarkFilter = VectorFilter<3>;

impl LandmarkFilter {
    pub fn filter_landmark(&mut self, lm: Landmark, timestamp: f64, shared: &FilterConfig) -> Landmark {
        Landmark::from_array(self.filter(lm.to_array(), timestamp, shared))
    }
}

/// 1スロット分（21 ランドマーク × 3 軸）のフィルタ状態
///
/// 最初に手が観測されたときに確保される。スロットの中身が別の手に
/// 入れ替わったと呼び出し側が判断したら `reset` で状態を捨てる
/// （確保済みの領域と個別パラメータは残る）。
#[derive(Debug, Clone)]
pub struct HandFilter {
    landmarks: Option<Vec<LandmarkFilter>>,
    /// 確保前に設定された個別パラメータ（後から設定した値が勝つ）
    pending_overrides: [Option<FilterConfig>; HandLandmark::COUNT],
}

impl Default for HandFilter {
    fn default() -> Self {
        Self {
            landmarks: None,
            pending_overrides: [None; HandLandmark::COUNT],
        }
    }
}

impl HandFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.landmarks.is_some()
    }

    /// 21 点すべてを平滑化する。点数が足りない場合は呼び出し側で弾くこと
    pub fn filter(&mut self, landmarks: &[Landmark], timestamp: f64, shared: &FilterConfig) -> Vec<Landmark> {
        let filters = self.filters_mut();
        landmarks
            .iter()
            .take(HandLandmark::COUNT)
            .zip(filters.iter_mut())
            .map(|(lm, f)| f.filter_landmark(*lm, timestamp, shared))
            .collect()
    }

    /// ランドマーク単位で共有パラメータを上書きする。`None` で解除
    pub fn set_override(&mut self, landmark: HandLandmark, params: Option<FilterConfig>) {
        match self.landmarks.as_mut() {
            Some(filters) => filters[landmark as usize].set_override(params),
            None => self.pending_overrides[landmark as usize] = params,
        }
    }

    /// `(landmark, axis)` のフィルタ状態
    pub fn state(&self, landmark: HandLandmark, axis: usize) -> Option<&ScalarFilter> {
        self.landmarks.as_ref()?.get(landmark as usize)?.axis(axis)
    }

    pub fn reset(&mut self) {
        if let Some(filters) = self.landmarks.as_mut() {
            for f in filters {
                f.reset();
            }
        }
    }

    fn filters_mut(&mut self) -> &mut Vec<LandmarkFilter> {
        let pending = &mut self.pending_overrides;
        self.landmarks.get_or_insert_with(|| {
            pending
                .iter_mut()
                .map(|params| {
                    let mut filter = LandmarkFilter::new();
                    filter.set_override(params.take());
                    filter
                })
                .collect()
        })
    }
}
