//! 3点角度と3D距離
//!
//! 内積で角度を求め、浮動小数点誤差で acos の定義域を外れないよう
//! コサインを [-1, 1] にクランプする。

use crate::hand::Landmark;

/// これより短いベクトルは方向が定まらないとみなす
const MIN_RAY_LENGTH: f32 = 1e-6;

/// 頂点 b における b→a と b→c のなす角（度, 0〜180）
///
/// - 180° = a, b, c が一直線（指がまっすぐ）
/// - 0° = 折り返し
///
/// どちらかのベクトル長がほぼ 0 の場合は一直線とみなして 180° を返す。
pub fn angle_degrees(a: &Landmark, b: &Landmark, c: &Landmark) -> f32 {
    let v1 = a.to_vector() - b.to_vector();
    let v2 = c.to_vector() - b.to_vector();

    let mag1 = v1.norm();
    let mag2 = v2.norm();
    if !(mag1 >= MIN_RAY_LENGTH && mag2 >= MIN_RAY_LENGTH) {
        return 180.0;
    }

    let cos_angle = (v1.dot(&v2) / (mag1 * mag2)).clamp(-1.0, 1.0);
    let degrees = cos_angle.acos().to_degrees();
    if degrees.is_finite() {
        // to_degrees の丸めで 180 をわずかに超えることがある
        degrees.clamp(0.0, 180.0)
    } else {
        180.0
    }
}

/// 屈曲角: 180° − なす角。0° = まっすぐ、大きいほど曲がっている
pub fn flexion_degrees(a: &Landmark, b: &Landmark, c: &Landmark) -> f32 {
    180.0 - angle_degrees(a, b, c)
}

/// ユークリッド距離
pub fn distance_3d(a: &Landmark, b: &Landmark) -> f32 {
    (a.to_vector() - b.to_vector()).norm()
}
