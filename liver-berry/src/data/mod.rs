use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis, Zip};

use crate::consts::gray::*;
use crate::Idx3d;

pub(crate) mod meta;
pub mod resample;
pub mod slice;
pub mod window;

pub use meta::Metadata;
pub use slice::{MaskSlice, MaskSliceMut};
pub use window::CtWindow;

/// 窗口归一化后的 3D CT 体数据, 按 (z, H, W) 组织, 值域为 \[0, 1\], 以 `f32` 保存.
///
/// 体数据一经产生便不可修改, 因此不提供可变访问.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 直接包装已经归一化到 \[0, 1\] 的数据.
    ///
    /// 调用者负责保证值域, 函数只在 debug 模式下检查.
    pub fn new(data: Array3<f32>) -> Self {
        debug_assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        Self { data }
    }

    /// 用 CT 窗 `window` 将 HU 值体数据归一化.
    #[inline]
    pub fn from_hu(hu: ArrayView3<'_, f32>, window: &CtWindow) -> Self {
        Self {
            data: window.normalize(hu),
        }
    }

    /// 获取数据形状大小 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }
}

/// 3D 二值肝脏 mask, 按 (z, H, W) 组织. 体素值只能是
/// [`MASK_BACKGROUND`] 或 [`MASK_LIVER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array3<u8>,
}

impl Index<Idx3d> for Mask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Mask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Mask {
    /// 按 `> threshold` 规则将概率场二值化.
    ///
    /// 对已经是 {0, 1} 的输入重复调用结果不变.
    pub fn from_probabilities(field: ArrayView3<'_, f32>, threshold: f32) -> Self {
        Self {
            data: field.mapv(|p| if p > threshold { MASK_LIVER } else { MASK_BACKGROUND }),
        }
    }

    /// 从任意 `u8` 数组构建 mask. 所有非零体素都被视为肝脏.
    pub fn from_raw(data: Array3<u8>) -> Self {
        let mut data = data;
        data.mapv_inplace(|p| if p > 0 { MASK_LIVER } else { MASK_BACKGROUND });
        Self { data }
    }

    /// 构建形状为 `shape` 的全背景 mask.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self {
            data: Array3::zeros(shape),
        }
    }

    /// 获取数据形状大小 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    ///
    /// 写入 {0, 1} 以外的值会破坏 mask 的不变式, 后果由调用者承担.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.data.view_mut()
    }

    /// 前景 (肝脏) 体素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|p| is_liver(**p)).count()
    }

    /// mask 是否为全背景?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 所有体素是否都是 {0, 1}?
    #[inline]
    pub fn is_binary(&self) -> bool {
        self.data.iter().all(|p| matches!(*p, MASK_BACKGROUND | MASK_LIVER))
    }

    /// 与 `other` 逐体素比较, 返回值不同的体素个数. 形状不同时 panic.
    pub fn diff_count(&self, other: &Mask) -> usize {
        let mut n = 0usize;
        Zip::from(&self.data).and(&other.data).for_each(|a, b| {
            if a != b {
                n += 1;
            }
        });
        n
    }

    /// 获取能按升序迭代水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = MaskSlice> {
        self.data.axis_iter(Axis(0)).map(MaskSlice::new)
    }

    /// 获取能按升序迭代水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = MaskSliceMut> {
        self.data.axis_iter_mut(Axis(0)).map(MaskSliceMut::new)
    }

    /// 获取 `pos` 前后上下左右六个点的坐标.
    ///
    /// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
    pub(crate) fn diamond_neighbours(&self, (z, h, w): Idx3d) -> Vec<Idx3d> {
        self.check_collect([
            (z.wrapping_sub(1), h, w),
            (z.saturating_add(1), h, w),
            (z, h.wrapping_sub(1), w),
            (z, h.saturating_add(1), w),
            (z, h, w.wrapping_sub(1)),
            (z, h, w.saturating_add(1)),
        ])
    }

    /// 判断 `pos` 是否位于长方体的六个表面之一.
    #[inline]
    pub(crate) fn is_at_surface6(&self, (z, h, w): Idx3d) -> bool {
        let (lz, lh, lw) = self.shape();
        z == 0 || h == 0 || w == 0 || z + 1 == lz || h + 1 == lh || w + 1 == lw
    }

    /// 收集 `data` 中不越界的索引.
    #[inline]
    fn check_collect<B: FromIterator<Idx3d>, const N: usize>(&self, data: [Idx3d; N]) -> B {
        data.into_iter().filter(|p| self.check(p)).collect()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl Mask {
    /// 借助 `rayon`, 并行地对每个水平可变切片实施 `op` 操作.
    pub fn par_for_each_slice_mut<F>(&mut self, op: F)
    where
        F: Fn(MaskSliceMut) + Sync + Send,
    {
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(MaskSliceMut::new(v));
            });
    }
}
