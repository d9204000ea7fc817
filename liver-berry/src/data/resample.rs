//! 体数据重采样.
//!
//! 目前只计算缩放因子, 不改变数据.

use ndarray::Array3;

use crate::data::meta::check_spacing;
use crate::{SegResult, Spacing};

/// 从 `current` 分辨率重采样到 `target` 分辨率时各轴的缩放因子.
pub fn zoom_factors(current: Spacing, target: Spacing) -> SegResult<[f64; 3]> {
    check_spacing(current)?;
    check_spacing(target)?;
    Ok([
        current[0] / target[0],
        current[1] / target[1],
        current[2] / target[2],
    ])
}

/// 将体数据从 `current` 分辨率重采样到 `target` 分辨率.
///
/// 插值尚未实现: 函数计算并记录缩放因子后原样返回数据.
pub fn resample(data: Array3<f32>, current: Spacing, target: Spacing) -> SegResult<Array3<f32>> {
    let factors = zoom_factors(current, target)?;
    log::debug!(
        "重采样 {:?}: {:?} -> {:?}, 缩放因子 {:?} (未插值)",
        data.dim(),
        current,
        target,
        factors
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_factors() {
        assert_eq!(
            zoom_factors([3.0, 1.0, 0.5], [1.5, 1.0, 1.0]).unwrap(),
            [2.0, 1.0, 0.5]
        );
        assert!(zoom_factors([0.0, 1.0, 1.0], [1.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn test_resample_keeps_data() {
        let data = Array3::<f32>::zeros((2, 3, 4));
        let out = resample(data.clone(), [1.0; 3], [1.5, 1.0, 1.0]).unwrap();
        assert_eq!(out, data);
    }
}
