//! 分割质量指标: 重叠, 分类, 体积指标与临床分级.
//!
//! 所有比例型指标共用平滑常数 [`SMOOTH`], 分母为零时不会出错.
//! 输入按 `> 0` 二值化, 因此接受任意数值类型的 mask.
//!
//! # 注意
//!
//! 两个输入的形状必须相同, 否则函数 panic. 流水线在调用前已经检查形状.

mod grade;
mod report;
mod surface;

use ndarray::{ArrayBase, ArrayView3, Data, Dimension, Zip};
use num::Zero;
use serde::{Deserialize, Serialize};

use crate::consts::SMOOTH;
use crate::{Mask, SegError, SegResult, Spacing};

pub use grade::{ClinicalAssessment, ClinicalCriteria, QualityGrade};
pub use surface::{hausdorff95, Hausdorff95, NoSurfaceDistance, SurfaceDistance};

/// 混淆矩阵. 以真值为参照.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// 真阳性.
    #[serde(rename = "tp")]
    pub true_positive: u64,

    /// 真阴性.
    #[serde(rename = "tn")]
    pub true_negative: u64,

    /// 假阳性.
    #[serde(rename = "fp")]
    pub false_positive: u64,

    /// 假阴性.
    #[serde(rename = "fn")]
    pub false_negative: u64,
}

impl ConfusionMatrix {
    /// 体素总数.
    #[inline]
    pub fn total(&self) -> u64 {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    /// `(2·TP + ε) / (|A| + |B| + ε)`.
    pub fn dice(&self) -> f64 {
        let tp = self.true_positive;
        let sizes = 2 * tp + self.false_positive + self.false_negative;
        (2.0 * tp as f64 + SMOOTH) / (sizes as f64 + SMOOTH)
    }

    /// `(TP + ε) / (|A ∪ B| + ε)`.
    pub fn iou(&self) -> f64 {
        let tp = self.true_positive;
        let union = tp + self.false_positive + self.false_negative;
        (tp as f64 + SMOOTH) / (union as f64 + SMOOTH)
    }

    /// `(TP + ε) / (TP + FN + ε)`.
    pub fn sensitivity(&self) -> f64 {
        let tp = self.true_positive;
        (tp as f64 + SMOOTH) / ((tp + self.false_negative) as f64 + SMOOTH)
    }

    /// `(TN + ε) / (TN + FP + ε)`.
    pub fn specificity(&self) -> f64 {
        let tn = self.true_negative;
        (tn as f64 + SMOOTH) / ((tn + self.false_positive) as f64 + SMOOTH)
    }

    /// `(TP + TN) / total`, 不做平滑. 空输入返回 1.
    pub fn pixel_accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        (self.true_positive + self.true_negative) as f64 / total as f64
    }
}

/// 计算混淆矩阵.
pub fn confusion_matrix<S1, S2, A, B, D>(
    ground_truth: &ArrayBase<S1, D>,
    prediction: &ArrayBase<S2, D>,
) -> ConfusionMatrix
where
    S1: Data<Elem = A>,
    S2: Data<Elem = B>,
    A: Zero + PartialOrd,
    B: Zero + PartialOrd,
    D: Dimension,
{
    let mut cm = ConfusionMatrix::default();
    Zip::from(ground_truth)
        .and(prediction)
        .for_each(|g, p| match (*g > A::zero(), *p > B::zero()) {
            (true, true) => cm.true_positive += 1,
            (false, false) => cm.true_negative += 1,
            (false, true) => cm.false_positive += 1,
            (true, false) => cm.false_negative += 1,
        });
    cm
}

macro_rules! impl_ratio_fn {
    ($(#[$doc: meta])* $name: ident) => {
        $(#[$doc])*
        pub fn $name<S1, S2, A, B, D>(
            ground_truth: &ArrayBase<S1, D>,
            prediction: &ArrayBase<S2, D>,
        ) -> f64
        where
            S1: Data<Elem = A>,
            S2: Data<Elem = B>,
            A: Zero + PartialOrd,
            B: Zero + PartialOrd,
            D: Dimension,
        {
            confusion_matrix(ground_truth, prediction).$name()
        }
    };
}

impl_ratio_fn!(
    /// Dice 系数. 对两个参数严格对称.
    dice
);
impl_ratio_fn!(
    /// IoU (Jaccard 指数). 对两个参数严格对称.
    iou
);
impl_ratio_fn!(
    /// 敏感度 (召回率).
    sensitivity
);
impl_ratio_fn!(
    /// 特异度.
    specificity
);
impl_ratio_fn!(
    /// 像素准确率. 两个参数相同时严格等于 1.
    pixel_accuracy
);

/// 四舍五入到 `digits` 位小数.
#[inline]
pub(crate) fn round_to(v: f64, digits: i32) -> f64 {
    let m = 10f64.powi(digits);
    (v * m).round() / m
}

/// 重叠与分类指标. 需要真值.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapMetrics {
    /// Dice 系数.
    pub dice: f64,
    /// IoU.
    pub iou: f64,
    /// 敏感度.
    pub sensitivity: f64,
    /// 特异度.
    pub specificity: f64,
    /// 像素准确率.
    pub pixel_accuracy: f64,
}

impl OverlapMetrics {
    /// 由混淆矩阵计算, 各比例保留 6 位小数.
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        Self {
            dice: round_to(cm.dice(), 6),
            iou: round_to(cm.iou(), 6),
            sensitivity: round_to(cm.sensitivity(), 6),
            specificity: round_to(cm.specificity(), 6),
            pixel_accuracy: round_to(cm.pixel_accuracy(), 6),
        }
    }
}

/// 体积指标.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetrics {
    /// 体积, 毫升, 保留 2 位小数.
    pub volume_ml: f64,
    /// 体积, 立方毫米, 保留 2 位小数.
    pub volume_mm3: f64,
    /// 前景体素数.
    pub voxel_count: u64,
}

/// 由前景体素数与体素分辨率计算体积指标.
pub fn volume_from_count(voxel_count: u64, spacing: Spacing) -> VolumeMetrics {
    let voxel_volume: f64 = spacing.iter().product();
    let volume_mm3 = voxel_count as f64 * voxel_volume;
    VolumeMetrics {
        volume_ml: round_to(volume_mm3 / 1000.0, 2),
        volume_mm3: round_to(volume_mm3, 2),
        voxel_count,
    }
}

/// 计算 `mask` 中前景 (`> 0`) 的体积.
pub fn calculate_volume<S, A, D>(mask: &ArrayBase<S, D>, spacing: Spacing) -> VolumeMetrics
where
    S: Data<Elem = A>,
    A: Zero + PartialOrd,
    D: Dimension,
{
    let count = mask.iter().filter(|v| **v > A::zero()).count();
    volume_from_count(count as u64, spacing)
}

/// 一次推理的全部指标. 序列化为扁平的 JSON 对象.
///
/// 没有真值时只有体积指标.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// 重叠与分类指标.
    #[serde(flatten)]
    pub overlap: Option<OverlapMetrics>,

    /// 体积指标.
    #[serde(flatten)]
    pub volume: VolumeMetrics,

    /// 临床评估.
    #[serde(flatten)]
    pub clinical: Option<ClinicalAssessment>,

    /// 95% Hausdorff 距离 (毫米). 仅在启用且两侧表面均非空时存在.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hausdorff95_mm: Option<f64>,
}

impl Metrics {
    /// 仅包含体积指标.
    #[inline]
    pub fn volume_only(volume: VolumeMetrics) -> Self {
        Self {
            overlap: None,
            volume,
            clinical: None,
            hausdorff95_mm: None,
        }
    }

    /// 是否包含与真值比较的指标?
    #[inline]
    pub fn has_ground_truth(&self) -> bool {
        self.overlap.is_some()
    }
}

/// 使用默认临床标准计算全部指标 (不含 Hausdorff 距离).
pub fn calculate_all_metrics<S1, S2, A, B>(
    ground_truth: &ArrayBase<S1, ndarray::Ix3>,
    prediction: &ArrayBase<S2, ndarray::Ix3>,
    spacing: Spacing,
) -> Metrics
where
    S1: Data<Elem = A>,
    S2: Data<Elem = B>,
    A: Zero + PartialOrd,
    B: Zero + PartialOrd,
{
    let cm = confusion_matrix(ground_truth, prediction);
    let overlap = OverlapMetrics::from_confusion(&cm);
    let criteria = ClinicalCriteria::default();
    Metrics {
        overlap: Some(overlap),
        volume: calculate_volume(prediction, spacing),
        clinical: Some(criteria.assess(overlap.dice, overlap.iou)),
        hausdorff95_mm: None,
    }
}

/// 指标引擎配置.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 是否计算 95% Hausdorff 距离.
    pub hausdorff95: bool,
}

/// 指标引擎: 临床标准与表面距离策略.
pub struct MetricsEngine {
    criteria: ClinicalCriteria,
    surface: Box<dyn SurfaceDistance>,
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new(ClinicalCriteria::default(), Box::new(NoSurfaceDistance))
    }
}

impl MetricsEngine {
    /// 直接构建.
    pub fn new(criteria: ClinicalCriteria, surface: Box<dyn SurfaceDistance>) -> Self {
        Self { criteria, surface }
    }

    /// 按配置构建.
    pub fn from_config(criteria: ClinicalCriteria, cfg: &MetricsConfig) -> Self {
        let surface: Box<dyn SurfaceDistance> = if cfg.hausdorff95 {
            Box::new(Hausdorff95)
        } else {
            Box::new(NoSurfaceDistance)
        };
        Self::new(criteria, surface)
    }

    /// 当前使用的临床标准.
    #[inline]
    pub fn criteria(&self) -> &ClinicalCriteria {
        &self.criteria
    }

    /// 计算 `prediction` 的指标. 提供 `ground_truth` 时计算全部指标.
    ///
    /// 真值形状与预测不一致时返回 [`SegError::ShapeMismatch`].
    pub fn evaluate(
        &self,
        prediction: &Mask,
        ground_truth: Option<ArrayView3<'_, u8>>,
        spacing: Spacing,
    ) -> SegResult<Metrics> {
        let volume = volume_from_count(prediction.count_foreground() as u64, spacing);
        let Some(gt) = ground_truth else {
            return Ok(Metrics::volume_only(volume));
        };

        let (z, h, w) = prediction.shape();
        if gt.shape() != [z, h, w] {
            return Err(SegError::ShapeMismatch {
                what: "真值 mask",
                expected: [z, h, w],
                found: gt.shape().to_vec(),
            });
        }
        let cm = confusion_matrix(&gt, &prediction.data());
        let overlap = OverlapMetrics::from_confusion(&cm);
        let hausdorff95_mm = self.surface.compute(gt, prediction.data(), spacing);
        if let Some(d) = hausdorff95_mm {
            log::debug!("{}: {:.3} mm", self.surface.name(), d);
        }
        Ok(Metrics {
            overlap: Some(overlap),
            volume,
            clinical: Some(self.criteria.assess(overlap.dice, overlap.iou)),
            hausdorff95_mm,
        })
    }
}
