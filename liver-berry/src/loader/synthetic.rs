use ndarray::{s, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{Idx3d, SegError, SegResult};

/// 合成体数据源. 在影像后端不可用时代替真实扫描.
///
/// 生成的体数据已在 \[0, 1\] 内: 背景为截断的正态噪声,
/// 每个轴中间三分之一构成的中心区域整体提亮, 模拟器官.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticVolume {
    /// 形状 (z, H, W).
    pub shape: Idx3d,

    /// 随机种子. `None` 时每次生成不同的数据.
    pub seed: Option<u64>,

    /// 背景噪声均值.
    pub background_mean: f32,

    /// 背景噪声标准差.
    pub background_std: f32,

    /// 中心区域的亮度增量.
    pub organ_boost: f32,
}

impl Default for SyntheticVolume {
    fn default() -> Self {
        Self {
            shape: (100, 512, 512),
            seed: None,
            background_mean: 0.3,
            background_std: 0.1,
            organ_boost: 0.2,
        }
    }
}

impl SyntheticVolume {
    /// 生成一份合成体数据.
    pub fn generate(&self) -> SegResult<Array3<f32>> {
        let normal = Normal::new(self.background_mean, self.background_std)
            .map_err(|e| SegError::Synthetic(e.to_string()))?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut data =
            Array3::from_shape_simple_fn(self.shape, || normal.sample(&mut rng).clamp(0.0, 1.0));
        let (z, h, w) = self.shape;
        let boost = self.organ_boost;
        data.slice_mut(s![z / 3..2 * z / 3, h / 3..2 * h / 3, w / 3..2 * w / 3])
            .mapv_inplace(|v| (v + boost).clamp(0.0, 1.0));
        Ok(data)
    }
}
