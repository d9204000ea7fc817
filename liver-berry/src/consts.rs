//! 通用常量.

/// 单通道 mask 像素值.
pub mod gray {
    /// mask 中背景的像素值.
    pub const MASK_BACKGROUND: u8 = 0;

    /// mask 中肝脏的像素值.
    pub const MASK_LIVER: u8 = 1;

    /// 像素是否是肝脏?
    #[inline]
    pub const fn is_liver(p: u8) -> bool {
        matches!(p, MASK_LIVER)
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, MASK_BACKGROUND)
    }
}

/// 所有比例型指标共用的平滑常数, 避免除零.
pub const SMOOTH: f64 = 1e-7;

/// 概率场二值化阈值. 严格大于该值的体素为前景.
pub const PROBABILITY_THRESHOLD: f32 = 0.5;

/// 后处理时保留连通域的最小体素数.
pub const DEFAULT_MIN_VOLUME_VOXELS: usize = 1000;

/// 缺失元信息时使用的体素分辨率.
pub const DEFAULT_SPACING: crate::Spacing = [1.0, 1.0, 1.0];

/// 重采样目标分辨率 (z, 高, 宽).
pub const DEFAULT_TARGET_SPACING: crate::Spacing = [1.5, 1.0, 1.0];

/// 缺失元信息时使用的切片行数.
pub const DEFAULT_ROWS: usize = 512;

/// 缺失元信息时使用的切片列数.
pub const DEFAULT_COLUMNS: usize = 512;

/// 腹部 CT 常用的 HU 截断下限.
pub const ABDOMEN_MIN_HU: f32 = -200.0;

/// 腹部 CT 常用的 HU 截断上限.
pub const ABDOMEN_MAX_HU: f32 = 300.0;

/// 结果 ID 前缀.
pub const RESULT_ID_PREFIX: &str = "seg_";

/// 体素/像素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    /// `MASK_BACKGROUND`, 代表背景.
    Background,

    /// `MASK_LIVER`, 代表前景.
    Foreground,
}

impl ElemType {
    /// 是否为前景.
    #[inline]
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }

    /// 是否为背景.
    #[inline]
    pub fn is_background(&self) -> bool {
        !self.is_foreground()
    }
}

impl From<u8> for ElemType {
    #[inline]
    fn from(p: u8) -> Self {
        if gray::is_background(p) {
            Self::Background
        } else {
            Self::Foreground
        }
    }
}
