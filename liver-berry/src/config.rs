//! 流水线配置.
//!
//! 所有字段都有默认值, TOML 中缺失的部分取默认:
//!
//! ```toml
//! output_dir = "tmp/segmentation_results"
//! allow_synthetic_fallback = true
//! target_spacing = [1.5, 1.0, 1.0]
//!
//! [window]
//! center = 40.0
//! width = 400.0
//!
//! [postprocess]
//! threshold = 0.5
//! min_volume_voxels = 1000
//! hole_filling = "volumetric"
//! smoothing = true
//!
//! [clinical]
//! excellent = 0.90
//! good = 0.80
//! fair = 0.70
//! min_dice = 0.90
//! min_iou = 0.90
//!
//! [metrics]
//! hausdorff95 = false
//!
//! [summary]
//! num_slices = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_TARGET_SPACING;
use crate::loader::SyntheticVolume;
use crate::metrics::{ClinicalCriteria, MetricsConfig};
use crate::post_proc::PostprocessConfig;
use crate::{CtWindow, SegError, SegResult, Spacing};

/// 默认结果根目录.
pub const DEFAULT_OUTPUT_DIR: &str = "tmp/segmentation_results";

/// 切片摘要参数.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// 期望的采样切片数. 缺失或为 0 时检查每一层.
    pub num_slices: Option<usize>,
}

/// 整个流水线的配置.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 结果根目录.
    pub output_dir: PathBuf,

    /// 影像后端不可用时是否允许回退到合成数据.
    pub allow_synthetic_fallback: bool,

    /// 重采样目标分辨率 (z, 高, 宽).
    pub target_spacing: Spacing,

    /// 归一化使用的 CT 窗.
    pub window: CtWindow,

    /// 后处理参数.
    pub postprocess: PostprocessConfig,

    /// 临床分级标准.
    pub clinical: ClinicalCriteria,

    /// 指标引擎参数.
    pub metrics: MetricsConfig,

    /// 切片摘要参数.
    pub summary: SummaryConfig,

    /// 合成数据源参数.
    pub synthetic: SyntheticVolume,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            allow_synthetic_fallback: true,
            target_spacing: DEFAULT_TARGET_SPACING,
            window: CtWindow::from_liver(),
            postprocess: PostprocessConfig::default(),
            clinical: ClinicalCriteria::default(),
            metrics: MetricsConfig::default(),
            summary: SummaryConfig::default(),
            synthetic: SyntheticVolume::default(),
        }
    }
}

impl PipelineConfig {
    /// 从 TOML 文本解析.
    pub fn from_toml_str(s: &str) -> SegResult<Self> {
        let cfg: Self = toml::from_str(s)?;
        crate::data::meta::check_spacing(cfg.target_spacing)?;
        Ok(cfg)
    }

    /// 从 TOML 文件加载.
    pub fn from_file<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SegError::NotFound(path.to_path_buf()));
        }
        let cfg = Self::from_toml_str(&fs::read_to_string(path)?)?;
        log::info!("已加载配置 {}", path.display());
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post_proc::HoleFilling;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(
            PipelineConfig::from_toml_str("").unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn test_partial() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            output_dir = "/data/out"
            allow_synthetic_fallback = false

            [window]
            center = 60.0
            width = 200.0

            [postprocess]
            min_volume_voxels = 10
            hole_filling = "axial"

            [clinical]
            min_iou = 0.85

            [metrics]
            hausdorff95 = true

            [summary]
            num_slices = 20

            [synthetic]
            shape = [4, 8, 8]
            seed = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.output_dir, PathBuf::from("/data/out"));
        assert!(!cfg.allow_synthetic_fallback);
        assert_eq!(cfg.window, CtWindow::new(60.0, 200.0).unwrap());
        assert_eq!(cfg.postprocess.min_volume_voxels, 10);
        assert_eq!(cfg.postprocess.hole_filling, HoleFilling::Axial);
        assert!(cfg.postprocess.smoothing);
        assert_eq!(cfg.clinical.min_iou, 0.85);
        assert_eq!(cfg.clinical.min_dice, 0.90);
        assert!(cfg.metrics.hausdorff95);
        assert_eq!(cfg.summary.num_slices, Some(20));
        assert_eq!(cfg.synthetic.shape, (4, 8, 8));
        assert_eq!(cfg.synthetic.seed, Some(3));
        assert_eq!(cfg.target_spacing, DEFAULT_TARGET_SPACING);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[window]\ncenter = 40.0\nwidth = -1.0"),
            Err(SegError::Config(_))
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("target_spacing = [0.0, 1.0, 1.0]"),
            Err(SegError::InvalidSpacing(_))
        ));
        assert!(matches!(
            PipelineConfig::from_file("/no/such/config.toml"),
            Err(SegError::NotFound(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = PipelineConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
