use std::f32::consts::PI;

use crate::config::FilterConfig;

/// Sample rate assumed until two distinct timestamps have been seen.
const DEFAULT_RATE: f32 = 30.0;

/// Low-pass filter component
#[derive(Debug, Clone, Copy, Default)]
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        let result = match self.prev {
            // 入力が前回値と等しければ誤差なく前回値を返す形
            Some(prev) => prev + alpha * (value - prev),
            None => value,
        };
        self.prev = Some(result);
        result
    }

    fn last(&self) -> Option<f32> {
        self.prev
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc), Te = 1/rate
fn smoothing_factor(rate: f32, cutoff: f32) -> f32 {
    let tau = 1.0 / (2.0 * PI * cutoff);
    let te = 1.0 / rate;
    1.0 / (1.0 + tau / te)
}

/// One Euro Filter state for a single scalar channel.
///
/// Parameters are passed on every call rather than stored, so a parameter
/// change applies to every live channel on the next sample while the smoothed
/// value and derivative carry over untouched.
#[derive(Debug, Clone, Default)]
pub struct ScalarFilter {
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    last_time: Option<f64>,
    rate: Option<f32>,
}

impl ScalarFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `value` sampled at `timestamp` (seconds).
    ///
    /// Timestamps that do not advance reuse the previous sample rate; the
    /// first sample passes through unchanged.
    pub fn filter(&mut self, value: f32, timestamp: f64, params: &FilterConfig) -> f32 {
        let last_time = match self.last_time {
            Some(t) => t,
            None => {
                self.last_time = Some(timestamp);
                self.dx_filter.filter(0.0, 1.0);
                return self.x_filter.filter(value, 1.0);
            }
        };

        let elapsed = timestamp - last_time;
        let measured = if elapsed > 0.0 { (1.0 / elapsed) as f32 } else { 0.0 };
        let rate = if measured > 0.0 && measured.is_finite() {
            self.last_time = Some(timestamp);
            measured
        } else {
            self.rate.unwrap_or(DEFAULT_RATE)
        };
        self.rate = Some(rate);

        let prev = self.x_filter.last().unwrap_or(value);
        let dx = (value - prev) * rate;
        let edx = self
            .dx_filter
            .filter(dx, smoothing_factor(rate, params.derivative_cutoff));
        let cutoff = params.min_cutoff + params.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(rate, cutoff))
    }

    /// Last smoothed value, if any sample has been seen.
    pub fn value(&self) -> Option<f32> {
        self.x_filter.last()
    }

    /// Last smoothed derivative (units per second).
    pub fn derivative(&self) -> Option<f32> {
        self.dx_filter.last()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_time
    }

    pub fn reset(&mut self) {
        self.x_filter.reset();
        self.dx_filter.reset();
        self.last_time = None;
        self.rate = None;
    }
}
