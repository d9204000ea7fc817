use crate::consts::gray::*;
use crate::{Area2d, Areas2d, Idx2d, Predicate};
use ndarray::{ArrayView2, ArrayViewMut2};
use std::collections::{HashSet, VecDeque};
use std::ops::{Index, IndexMut};

/// 不可变、借用的二维水平 mask 切片.
pub struct MaskSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::Mask`].
    data: ArrayView2<'a, u8>,
}

impl Index<Idx2d> for MaskSlice<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// 可变、借用的二维水平 mask 切片.
pub struct MaskSliceMut<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::Mask`].
    data: ArrayViewMut2<'a, u8>,
}

/// 可变方法集合.
impl<'a> MaskSliceMut<'a> {
    /// 将 `it` 中的每个索引对应的像素改为 `new`.
    pub(crate) fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            self[pos] = new;
        }
    }

    /// 将被前景完全包围的背景区域 (按 4-邻接, 且不接触图像边缘) 填充为肝脏像素.
    ///
    /// 返回被填充的像素个数.
    pub fn fill_enclosed_background(&mut self) -> usize {
        let mut filled = 0;
        for area in self.background_areas() {
            if self.all_within(&area) {
                filled += area.len();
                self.fill_batch(area, MASK_LIVER);
            }
        }
        filled
    }
}

impl Index<Idx2d> for MaskSliceMut<'_> {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for MaskSliceMut<'_> {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// mask 切片不可变方法集合.
macro_rules! impl_mask_slice_immut {
    ($life: lifetime, $slice: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $slice {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 统计图像中肝脏像素的总个数.
            #[inline]
            pub fn liver_area(&self) -> usize {
                self.data.iter().filter(|&p| is_liver(*p)).count()
            }

            /// 获得图像的高.
            #[inline]
            pub fn height(&self) -> usize {
                self.shape().0
            }

            /// 获得图像的宽.
            #[inline]
            pub fn width(&self) -> usize {
                self.shape().1
            }

            /// 判断一个索引是否位于图像的边缘.
            #[inline]
            pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
                h == 0
                    || h.saturating_add(1) == self.height()
                    || w == 0
                    || w.saturating_add(1) == self.width()
            }

            /// 判断 `positions` 的索引是否全部都在图像的内部.
            #[inline]
            pub(crate) fn all_within(&self, positions: &[Idx2d]) -> bool {
                positions.iter().all(|p| !self.is_at_border(*p))
            }

            /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                super::PosIter::new(self.shape())
            }

            /// 按照 4-相邻规则获取所有区域. 两个像素 `p1` 和 `p2` 属于同一个区域,
            /// 当且仅当存在一条从 `p1` 到 `p2` 的 4-相邻路径, 且路径上的所有像素
            /// (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
            pub fn areas(&self, pred: Predicate) -> Areas2d {
                self.areas_from_local(self.pos_iter(), pred)
            }

            /// 按照 4-相邻原则获得图像中所有背景区域.
            #[inline]
            pub fn background_areas(&self) -> Areas2d {
                self.areas(is_background)
            }

            /// 按照 4-相邻规则获取所有区域, 但区域起点由 `it` 指定.
            pub fn areas_from_local<I: IntoIterator<Item = Idx2d>>(
                &self,
                it: I,
                pred: Predicate,
            ) -> Areas2d {
                let mut ans = Areas2d::with_capacity(1);
                let mut bfs_q = VecDeque::with_capacity(4);
                let mut set = HashSet::with_capacity(16);

                for pos in it.into_iter() {
                    if set.contains(&pos) || !pred(self[pos]) {
                        continue;
                    }
                    bfs_q.push_back(pos);
                    let mut this_area = Area2d::with_capacity(1);
                    while let Some(cur_pos) = bfs_q.pop_front() {
                        if !set.insert(cur_pos) {
                            continue;
                        }
                        this_area.push(cur_pos);

                        let (cur_h, cur_w) = cur_pos;
                        if cur_h > 0
                            && pred(self[(cur_h - 1, cur_w)])
                            && !set.contains(&(cur_h - 1, cur_w))
                        {
                            bfs_q.push_back((cur_h - 1, cur_w));
                        }
                        if cur_h.wrapping_add(1) < self.height()
                            && pred(self[(cur_h + 1, cur_w)])
                            && !set.contains(&(cur_h + 1, cur_w))
                        {
                            bfs_q.push_back((cur_h + 1, cur_w));
                        }
                        if cur_w > 0
                            && pred(self[(cur_h, cur_w - 1)])
                            && !set.contains(&(cur_h, cur_w - 1))
                        {
                            bfs_q.push_back((cur_h, cur_w - 1));
                        }
                        if cur_w.wrapping_add(1) < self.width()
                            && pred(self[(cur_h, cur_w + 1)])
                            && !set.contains(&(cur_h, cur_w + 1))
                        {
                            bfs_q.push_back((cur_h, cur_w + 1));
                        }
                    }
                    ans.push(this_area);
                }
                ans
            }
        }
    };
}
impl_mask_slice_immut!('a, MaskSlice<'a>, ArrayView2<'a, u8>);
impl_mask_slice_immut!('a, MaskSliceMut<'a>, ArrayViewMut2<'a, u8>);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};

    fn ring() -> Array2<u8> {
        arr2(&[
            [0, 0, 0, 0, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 0, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 0, 0, 0, 0],
        ])
    }

    #[test]
    fn test_areas() {
        let data = ring();
        let slice = MaskSlice::new(data.view());
        let liver = slice.areas(is_liver);
        assert_eq!(liver.len(), 1);
        assert_eq!(liver[0].len(), 8);
        // 外围背景和中心空洞.
        let bg = slice.background_areas();
        assert_eq!(bg.len(), 2);
        assert_eq!(bg.iter().map(Vec::len).sum::<usize>(), 17);
        assert_eq!(slice.liver_area(), 8);
    }

    #[test]
    fn test_fill_enclosed_background() {
        let mut data = ring();
        let mut slice = MaskSliceMut::new(data.view_mut());
        assert_eq!(slice.fill_enclosed_background(), 1);
        assert_eq!(slice[(2, 2)], MASK_LIVER);
        assert_eq!(slice.liver_area(), 9);
        // 再次填充不改变结果.
        assert_eq!(slice.fill_enclosed_background(), 0);
    }

    #[test]
    fn test_border_touching_background_is_kept() {
        let mut data = arr2(&[[1, 0, 1], [1, 0, 1], [1, 1, 1]]);
        let mut slice = MaskSliceMut::new(data.view_mut());
        assert_eq!(slice.fill_enclosed_background(), 0);
        assert_eq!(slice.liver_area(), 7);
        assert!(slice.is_at_border((0, 1)));
        assert!(!slice.is_at_border((1, 1)));
    }
}
