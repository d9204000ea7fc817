use std::collections::VecDeque;

use ndarray::Array3;

use super::MaskRefiner;
use crate::consts::{gray::*, ElemType};
use crate::{Idx3d, Mask, Predicate};

/// 按照 6-相邻规则获取 `mask` 中所有满足 `pred` 的连通区域.
///
/// 区域按首个体素的行优先顺序排列, 区域内体素按 BFS 顺序排列.
pub fn connected_components(mask: &Mask, pred: Predicate) -> Vec<Vec<Idx3d>> {
    let mut visited = Array3::from_elem(mask.shape(), false);
    let mut ans = Vec::new();
    let mut bfs_q = VecDeque::with_capacity(16);

    for (pos, &pix) in mask.data().indexed_iter() {
        if visited[pos] || !pred(pix) {
            continue;
        }
        visited[pos] = true;
        bfs_q.push_back(pos);
        let mut this_area = Vec::with_capacity(1);
        while let Some(cur) = bfs_q.pop_front() {
            this_area.push(cur);
            for neigh in mask.diamond_neighbours(cur) {
                if !visited[neigh] && pred(mask[neigh]) {
                    visited[neigh] = true;
                    bfs_q.push_back(neigh);
                }
            }
        }
        ans.push(this_area);
    }
    ans
}

/// 去除体素数小于 `min_voxels` 的前景连通域 (6-相邻).
///
/// 所有过小的连通域都会被去除, 即使结果为全背景.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallComponentFilter {
    min_voxels: usize,
}

impl SmallComponentFilter {
    /// 构建过滤器.
    #[inline]
    pub const fn new(min_voxels: usize) -> Self {
        Self { min_voxels }
    }

    /// 最小保留体素数.
    #[inline]
    pub fn min_voxels(&self) -> usize {
        self.min_voxels
    }
}

impl MaskRefiner for SmallComponentFilter {
    fn name(&self) -> &'static str {
        "small_components"
    }

    fn refine(&self, mask: &mut Mask) -> usize {
        let components = connected_components(mask, |p| ElemType::from(p).is_foreground());
        let total = components.len();
        let mut removed = 0;
        let mut dropped = 0;
        for area in components.into_iter().filter(|a| a.len() < self.min_voxels) {
            dropped += 1;
            removed += area.len();
            for pos in area {
                mask[pos] = MASK_BACKGROUND;
            }
        }
        if dropped > 0 {
            log::debug!("去除了 {dropped}/{total} 个过小的连通域");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn two_blobs() -> Mask {
        let mut data = Array3::<u8>::zeros((6, 6, 6));
        data.slice_mut(s![0..3, 0..3, 0..3]).fill(MASK_LIVER);
        data[(5, 5, 5)] = MASK_LIVER;
        // 仅通过棱相邻, 不属于同一 6-连通域.
        data[(4, 4, 5)] = MASK_LIVER;
        Mask::from_raw(data)
    }

    #[test]
    fn test_connected_components() {
        let comps = connected_components(&two_blobs(), is_liver);
        let mut sizes: Vec<_> = comps.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, [1, 1, 27]);
    }

    #[test]
    fn test_filter() {
        let mut mask = two_blobs();
        assert_eq!(SmallComponentFilter::new(2).refine(&mut mask), 2);
        assert_eq!(mask.count_foreground(), 27);
        // 幂等.
        assert_eq!(SmallComponentFilter::new(2).refine(&mut mask), 0);
    }

    #[test]
    fn test_filter_can_empty_mask() {
        let mut mask = two_blobs();
        assert_eq!(SmallComponentFilter::new(1000).refine(&mut mask), 29);
        assert!(mask.is_background());
    }
}
