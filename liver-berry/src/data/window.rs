//! CT 窗与 HU 值截断.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::consts::{ABDOMEN_MAX_HU, ABDOMEN_MIN_HU};
use crate::{SegError, SegResult};

/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct CtWindow {
    level: f32,
    width: f32,
}

/// 配置文件中的 CT 窗表示.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
struct RawWindow {
    center: f32,
    width: f32,
}

impl TryFrom<RawWindow> for CtWindow {
    type Error = SegError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        CtWindow::new(raw.center, raw.width)
    }
}

impl From<CtWindow> for RawWindow {
    fn from(w: CtWindow) -> Self {
        Self {
            center: w.level,
            width: w.width,
        }
    }
}

impl Default for CtWindow {
    #[inline]
    fn default() -> Self {
        Self::from_liver()
    }
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 必须有限, `width` 必须为正, 否则返回 [`SegError::InvalidWindow`].
    pub fn new(level: f32, width: f32) -> SegResult<CtWindow> {
        if level.is_finite() && width.is_finite() && width > 0.0 {
            Ok(Self { level, width })
        } else {
            Err(SegError::InvalidWindow {
                center: level,
                width,
            })
        }
    }

    /// 腹部肝脏分割使用的 CT 窗口. 窗位为 40, 窗宽为 400.
    #[inline]
    pub const fn from_liver() -> CtWindow {
        Self {
            level: 40.0,
            width: 400.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的归一化强度 (0.0 <= value <= 1.0).
    ///
    /// 如果 `ct` 为 NaN, 则返回 `None`. 正负无穷分别映射为 1 和 0.
    pub fn eval_unit(&self, ct: f32) -> Option<f32> {
        if ct.is_nan() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(0.0)
        } else if ct >= self.upper_bound() {
            Some(1.0)
        } else {
            Some((ct - lb) / self.width)
        }
    }

    /// 将整个 HU 体数据截断到窗内并线性缩放到 \[0, 1\].
    ///
    /// NaN 体素被视为窗下限, 即映射为 0.
    pub fn normalize(&self, hu: ArrayView3<'_, f32>) -> Array3<f32> {
        hu.mapv(|v| self.eval_unit(v).unwrap_or(0.0))
    }
}

/// 以 `(center, width)` 窗口将 HU 体数据归一化到 \[0, 1\].
pub fn normalize_hounsfield_units(
    hu: ArrayView3<'_, f32>,
    window_center: f32,
    window_width: f32,
) -> SegResult<Array3<f32>> {
    Ok(CtWindow::new(window_center, window_width)?.normalize(hu))
}

/// 将 HU 体数据截断到 `[min_hu, max_hu]`, 不做缩放.
///
/// 当 `min_hu > max_hu` 或任一边界为 NaN 时 panic.
pub fn clip_hounsfield_units(hu: ArrayView3<'_, f32>, min_hu: f32, max_hu: f32) -> Array3<f32> {
    hu.mapv(|v| v.clamp(min_hu, max_hu))
}

/// 以腹部常用范围 (-200 到 300 HU) 截断.
#[inline]
pub fn clip_abdomen(hu: ArrayView3<'_, f32>) -> Array3<f32> {
    clip_hounsfield_units(hu, ABDOMEN_MIN_HU, ABDOMEN_MAX_HU)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(CtWindow::new(0.0, -1.0).is_err());
        assert!(CtWindow::new(0.0, 0.0).is_err());
        assert!(CtWindow::new(f32::NAN, 10.0).is_err());
        assert!(CtWindow::new(40.0, 400.0).is_ok());
    }

    #[test]
    fn test_eval_unit() {
        // [-160, 240]
        let ct = CtWindow::from_liver();
        assert_eq!(ct.eval_unit(f32::NAN), None);
        assert_eq!(ct.eval_unit(f32::NEG_INFINITY), Some(0.0));
        assert_eq!(ct.eval_unit(f32::INFINITY), Some(1.0));
        assert_eq!(ct.eval_unit(-1000.0), Some(0.0));
        assert_eq!(ct.eval_unit(-160.0), Some(0.0));
        assert!(float_eq(ct.eval_unit(40.0).unwrap(), 0.5));
        assert!(float_eq(ct.eval_unit(140.0).unwrap(), 0.75));
        assert_eq!(ct.eval_unit(240.0), Some(1.0));
        assert_eq!(ct.eval_unit(3000.0), Some(1.0));
    }

    #[test]
    fn test_normalize_volume() {
        let hu = Array3::from_shape_vec((1, 2, 2), vec![-1000.0, 40.0, f32::NAN, 500.0]).unwrap();
        let out = normalize_hounsfield_units(hu.view(), 40.0, 400.0).unwrap();
        assert_eq!(out.dim(), (1, 2, 2));
        assert_eq!(out[(0, 0, 0)], 0.0);
        assert!(float_eq(out[(0, 0, 1)], 0.5));
        assert_eq!(out[(0, 1, 0)], 0.0);
        assert_eq!(out[(0, 1, 1)], 1.0);
        assert!(normalize_hounsfield_units(hu.view(), 40.0, 0.0).is_err());
    }

    #[test]
    fn test_clip() {
        let hu = Array3::from_shape_vec((1, 1, 3), vec![-1000.0, 0.0, 1000.0]).unwrap();
        let out = clip_abdomen(hu.view());
        assert_eq!(out.into_raw_vec(), vec![-200.0, 0.0, 300.0]);
    }

    #[test]
    fn test_window_serde() {
        let w: CtWindow = toml::from_str("center = 60.0\nwidth = 200.0").unwrap();
        assert_eq!((w.level(), w.width()), (60.0, 200.0));
        assert!(toml::from_str::<CtWindow>("center = 60.0\nwidth = -1.0").is_err());
    }
}
