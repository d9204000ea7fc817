//! 概率场后处理: 阈值化与 mask 精修.
//!
//! 阈值化只在这里进行一次. 之后依次执行若干 [`MaskRefiner`],
//! 默认为小连通域去除, 空洞填充与边界平滑. 每个精修步骤都不改变 mask 形状,
//! 且对已经精修过的 mask 再次执行不会产生变化.

mod components;
mod hollow;
mod smooth;

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MIN_VOLUME_VOXELS, PROBABILITY_THRESHOLD};
use crate::Mask;

pub use components::{connected_components, SmallComponentFilter};
pub use hollow::{HoleFiller, HoleFilling};
pub use smooth::{closing, dilate, erode, opening, BoundarySmoother};

/// mask 精修步骤.
pub trait MaskRefiner: Send + Sync {
    /// 步骤名称, 用于日志.
    fn name(&self) -> &'static str;

    /// 就地修改 `mask`, 返回被修改的体素个数.
    fn refine(&self, mask: &mut Mask) -> usize;
}

/// 什么也不做的精修步骤. 用于关闭某个默认步骤.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl MaskRefiner for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    #[inline]
    fn refine(&self, _mask: &mut Mask) -> usize {
        0
    }
}

/// 后处理参数.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    /// 二值化阈值. 严格大于该值的体素为前景.
    pub threshold: f32,

    /// 保留连通域的最小体素数.
    pub min_volume_voxels: usize,

    /// 空洞填充方式.
    pub hole_filling: HoleFilling,

    /// 是否执行边界平滑.
    pub smoothing: bool,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            threshold: PROBABILITY_THRESHOLD,
            min_volume_voxels: DEFAULT_MIN_VOLUME_VOXELS,
            hole_filling: HoleFilling::Volumetric,
            smoothing: true,
        }
    }
}

/// 后处理器.
pub struct Postprocessor {
    threshold: f32,
    refiners: Vec<Box<dyn MaskRefiner>>,
}

impl Default for Postprocessor {
    fn default() -> Self {
        Self::from_config(&PostprocessConfig::default())
    }
}

impl Postprocessor {
    /// 使用默认步骤, 仅指定最小连通域体素数.
    pub fn new(min_volume_voxels: usize) -> Self {
        Self::from_config(&PostprocessConfig {
            min_volume_voxels,
            ..PostprocessConfig::default()
        })
    }

    /// 按配置构建.
    pub fn from_config(cfg: &PostprocessConfig) -> Self {
        let smoother: Box<dyn MaskRefiner> = if cfg.smoothing {
            Box::new(BoundarySmoother)
        } else {
            Box::new(Identity)
        };
        Self::with_refiners(
            cfg.threshold,
            vec![
                Box::new(SmallComponentFilter::new(cfg.min_volume_voxels)),
                Box::new(HoleFiller::new(cfg.hole_filling)),
                smoother,
            ],
        )
    }

    /// 自定义阈值与精修步骤.
    pub fn with_refiners(threshold: f32, refiners: Vec<Box<dyn MaskRefiner>>) -> Self {
        Self {
            threshold,
            refiners,
        }
    }

    /// 二值化阈值.
    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 将概率场转换为二值 mask.
    pub fn process(&self, field: ArrayView3<'_, f32>) -> Mask {
        let mut mask = Mask::from_probabilities(field, self.threshold);
        log::debug!(
            "阈值化 ({}) 后前景体素: {}",
            self.threshold,
            mask.count_foreground()
        );
        for refiner in self.refiners.iter() {
            let changed = refiner.refine(&mut mask);
            log::debug!("{}: 修改了 {} 个体素", refiner.name(), changed);
        }
        debug_assert!(mask.is_binary());
        mask
    }
}

/// 使用默认步骤处理概率场.
#[inline]
pub fn postprocess(field: ArrayView3<'_, f32>, min_volume_voxels: usize) -> Mask {
    Postprocessor::new(min_volume_voxels).process(field)
}
