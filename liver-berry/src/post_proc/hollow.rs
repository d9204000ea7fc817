use serde::{Deserialize, Serialize};

use super::{connected_components, MaskRefiner};
use crate::consts::{gray::*, ElemType};
use crate::Mask;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicUsize, Ordering};
    }
}

/// 空洞的判定方式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleFilling {
    /// 三维: 不与体数据六个表面 6-连通的背景区域视为空洞.
    #[default]
    Volumetric,

    /// 逐水平切片: 不接触切片边缘的 4-连通背景区域视为空洞.
    Axial,
}

/// 将被前景包围的背景空洞填充为肝脏.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoleFiller {
    mode: HoleFilling,
}

impl HoleFiller {
    /// 构建空洞填充器.
    #[inline]
    pub const fn new(mode: HoleFilling) -> Self {
        Self { mode }
    }

    fn fill_volumetric(mask: &mut Mask) -> usize {
        let mut filled = 0;
        for area in connected_components(mask, |p| ElemType::from(p).is_background()) {
            if area.iter().all(|p| !mask.is_at_surface6(*p)) {
                filled += area.len();
                for pos in area {
                    mask[pos] = MASK_LIVER;
                }
            }
        }
        filled
    }

    fn fill_axial(mask: &mut Mask) -> usize {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                let filled = AtomicUsize::new(0);
                mask.par_for_each_slice_mut(|mut slice| {
                    filled.fetch_add(slice.fill_enclosed_background(), Ordering::Relaxed);
                });
                filled.into_inner()
            } else {
                mask.slice_iter_mut()
                    .map(|mut slice| slice.fill_enclosed_background())
                    .sum()
            }
        }
    }
}

impl MaskRefiner for HoleFiller {
    fn name(&self) -> &'static str {
        match self.mode {
            HoleFilling::Volumetric => "fill_holes_3d",
            HoleFilling::Axial => "fill_holes_axial",
        }
    }

    fn refine(&self, mask: &mut Mask) -> usize {
        match self.mode {
            HoleFilling::Volumetric => Self::fill_volumetric(mask),
            HoleFilling::Axial => Self::fill_axial(mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    /// 5x5x5 空心立方壳, 中心一个背景体素.
    fn shell() -> Mask {
        let mut data = Array3::<u8>::zeros((7, 7, 7));
        data.slice_mut(s![1..6, 1..6, 1..6]).fill(MASK_LIVER);
        data.slice_mut(s![2..5, 2..5, 2..5]).fill(MASK_BACKGROUND);
        Mask::from_raw(data)
    }

    #[test]
    fn test_volumetric() {
        let mut mask = shell();
        let filler = HoleFiller::new(HoleFilling::Volumetric);
        assert_eq!(filler.refine(&mut mask), 27);
        assert_eq!(mask.count_foreground(), 125);
        assert_eq!(filler.refine(&mut mask), 0);
    }

    #[test]
    fn test_axial() {
        let mut mask = shell();
        let filler = HoleFiller::new(HoleFilling::Axial);
        // 只有 z = 2..5 三层切片中有被包围的 3x3 空洞.
        assert_eq!(filler.refine(&mut mask), 27);
        assert_eq!(filler.refine(&mut mask), 0);
    }

    #[test]
    fn test_open_cavity_is_kept() {
        // 空腔沿 z 方向贯通到表面.
        let mut data = Array3::<u8>::zeros((5, 5, 5));
        data.slice_mut(s![.., 1..4, 1..4]).fill(MASK_LIVER);
        data.slice_mut(s![.., 2..3, 2..3]).fill(MASK_BACKGROUND);
        let mut mask = Mask::from_raw(data);
        assert_eq!(HoleFiller::new(HoleFilling::Volumetric).refine(&mut mask), 0);
        // 但每个水平切片中它都是空洞.
        assert_eq!(HoleFiller::new(HoleFilling::Axial).refine(&mut mask), 5);
    }
}
