use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_COLUMNS, DEFAULT_ROWS, DEFAULT_SPACING};
use crate::{CtWindow, SegError, SegResult, Spacing};

/// 一次扫描的元信息.
///
/// `spacing` 依次为 (z, 高, 宽) 方向的体素分辨率, 单位毫米, 各分量必须为正.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// 患者标识.
    pub patient_id: String,

    /// 检查日期, 原样保存 (通常为 `YYYYMMDD`).
    pub study_date: String,

    /// 成像模态, 通常为 `CT`.
    pub modality: String,

    /// 切片行数.
    pub rows: usize,

    /// 切片列数.
    pub columns: usize,

    /// 体素分辨率 (z, 高, 宽), 单位毫米.
    pub spacing: Spacing,

    /// 窗位. 来自影像头或预处理配置.
    pub window_center: f32,

    /// 窗宽. 来自影像头或预处理配置.
    pub window_width: f32,

    /// 数据是否由合成数据源生成 (影像后端不可用时的回退).
    #[serde(default)]
    pub synthetic: bool,
}

impl Default for Metadata {
    fn default() -> Self {
        let window = CtWindow::from_liver();
        Self {
            patient_id: "UNKNOWN".to_string(),
            study_date: String::new(),
            modality: "CT".to_string(),
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
            spacing: DEFAULT_SPACING,
            window_center: window.level(),
            window_width: window.width(),
            synthetic: false,
        }
    }
}

impl Metadata {
    /// 根据给定的体数据形状与分辨率构建元信息, 其余字段取默认值.
    pub fn with_spacing(shape: crate::Idx3d, spacing: Spacing) -> SegResult<Self> {
        check_spacing(spacing)?;
        let (_, rows, columns) = shape;
        Ok(Self {
            rows,
            columns,
            spacing,
            ..Self::default()
        })
    }

    /// 合成数据使用的元信息.
    pub fn synthetic() -> Self {
        Self {
            patient_id: "MOCK_PATIENT".to_string(),
            study_date: "20240101".to_string(),
            spacing: [1.5, 1.0, 1.0],
            synthetic: true,
            ..Self::default()
        }
    }

    /// 单个体素的体积, 单位立方毫米.
    #[inline]
    pub fn voxel_volume(&self) -> f64 {
        self.spacing.iter().product()
    }
}

/// 检查体素分辨率的各分量是否为有限正数.
pub(crate) fn check_spacing(spacing: Spacing) -> SegResult<()> {
    if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
        Ok(())
    } else {
        Err(SegError::InvalidSpacing(spacing))
    }
}
