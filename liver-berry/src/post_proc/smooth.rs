//! 6-邻域结构元素下的形态学算子.
//!
//! 越界的邻居被忽略: 膨胀不会从边界外 "长入" 前景,
//! 腐蚀也不会因为边界外是背景而剥去贴着边界的前景.
//! 在该约定下膨胀与腐蚀互为伴随, 因此开/闭运算都是幂等的.

use ndarray::{Array3, ArrayView3, Zip};

use super::MaskRefiner;
use crate::consts::gray::*;
use crate::{Idx3d, Mask};

#[inline]
fn neighbours6(data: &ArrayView3<'_, u8>, (z, h, w): Idx3d) -> [Option<u8>; 6] {
    [
        data.get((z.wrapping_sub(1), h, w)).copied(),
        data.get((z.saturating_add(1), h, w)).copied(),
        data.get((z, h.wrapping_sub(1), w)).copied(),
        data.get((z, h.saturating_add(1), w)).copied(),
        data.get((z, h, w.wrapping_sub(1))).copied(),
        data.get((z, h, w.saturating_add(1))).copied(),
    ]
}

fn map_voxels<F>(data: ArrayView3<'_, u8>, op: F) -> Array3<u8>
where
    F: Fn(u8, [Option<u8>; 6]) -> bool + Sync + Send,
{
    let to_pixel = |fg: bool| if fg { MASK_LIVER } else { MASK_BACKGROUND };
    let zip = Zip::indexed(&data);
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_map_collect(|pos, &p| to_pixel(op(p, neighbours6(&data, pos))))
        } else {
            zip.map_collect(|pos, &p| to_pixel(op(p, neighbours6(&data, pos))))
        }
    }
}

/// 膨胀: 自身或任一 (界内) 6-邻居是前景的体素成为前景.
pub fn dilate(data: ArrayView3<'_, u8>) -> Array3<u8> {
    map_voxels(data, |p, n| {
        is_liver(p) || n.iter().flatten().copied().any(is_liver)
    })
}

/// 腐蚀: 自身与所有 (界内) 6-邻居都是前景的体素保持前景.
pub fn erode(data: ArrayView3<'_, u8>) -> Array3<u8> {
    map_voxels(data, |p, n| {
        is_liver(p) && n.iter().flatten().copied().all(is_liver)
    })
}

/// 闭运算: 先膨胀后腐蚀. 填补小凹陷.
#[inline]
pub fn closing(data: ArrayView3<'_, u8>) -> Array3<u8> {
    erode(dilate(data).view())
}

/// 开运算: 先腐蚀后膨胀. 去除细小突起.
#[inline]
pub fn opening(data: ArrayView3<'_, u8>) -> Array3<u8> {
    dilate(erode(data).view())
}

/// 边界平滑: 先闭运算再开运算.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoundarySmoother;

impl MaskRefiner for BoundarySmoother {
    fn name(&self) -> &'static str {
        "smooth_boundary"
    }

    fn refine(&self, mask: &mut Mask) -> usize {
        let smoothed = Mask::from_raw(opening(closing(mask.data()).view()));
        let changed = mask.diff_count(&smoothed);
        *mask = smoothed;
        changed
    }
}
