//! 表面距离.
//!
//! 与重叠指标一致, 所有非零体素都是前景. 表面体素定义为: 自身是前景,
//! 且至少有一个 6-邻居是背景或位于数据范围外.
//! 距离按体素分辨率换算为毫米, 使用精确的各向异性欧氏距离变换
//! (Felzenszwalb & Huttenlocher 下包络算法, 逐轴分离计算).

use ndarray::{Array3, ArrayView3, Axis};

use crate::{Idx3d, Spacing};

/// 表面距离指标.
pub trait SurfaceDistance: Send + Sync {
    /// 指标名称.
    fn name(&self) -> &'static str;

    /// 计算 `ground_truth` 与 `prediction` 之间的距离 (毫米).
    /// 任一侧表面为空时返回 `None`.
    fn compute(
        &self,
        ground_truth: ArrayView3<'_, u8>,
        prediction: ArrayView3<'_, u8>,
        spacing: Spacing,
    ) -> Option<f64>;
}

/// 不计算任何表面距离.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSurfaceDistance;

impl SurfaceDistance for NoSurfaceDistance {
    fn name(&self) -> &'static str {
        "none"
    }

    #[inline]
    fn compute(&self, _: ArrayView3<'_, u8>, _: ArrayView3<'_, u8>, _: Spacing) -> Option<f64> {
        None
    }
}

/// 95% 对称 Hausdorff 距离.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hausdorff95;

impl SurfaceDistance for Hausdorff95 {
    fn name(&self) -> &'static str {
        "hausdorff95"
    }

    fn compute(
        &self,
        ground_truth: ArrayView3<'_, u8>,
        prediction: ArrayView3<'_, u8>,
        spacing: Spacing,
    ) -> Option<f64> {
        hausdorff95(ground_truth, prediction, spacing)
    }
}

/// 95% 对称 Hausdorff 距离: 两侧表面体素到对侧表面最近距离的合并集合的
/// 第 95 百分位数 (线性插值), 单位毫米. 任一侧表面为空时返回 `None`.
pub fn hausdorff95(a: ArrayView3<'_, u8>, b: ArrayView3<'_, u8>, spacing: Spacing) -> Option<f64> {
    let (surface_a, pos_a) = surface(a);
    let (surface_b, pos_b) = surface(b);
    if pos_a.is_empty() || pos_b.is_empty() {
        return None;
    }
    let to_b = distance_transform(&surface_b, spacing);
    let to_a = distance_transform(&surface_a, spacing);
    let mut distances: Vec<f64> = pos_a
        .iter()
        .map(|p| to_b[*p])
        .chain(pos_b.iter().map(|p| to_a[*p]))
        .collect();
    Some(percentile(&mut distances, 95.0))
}

/// 提取表面体素, 同时返回布尔图和索引列表.
fn surface(mask: ArrayView3<'_, u8>) -> (Array3<bool>, Vec<Idx3d>) {
    let mut positions = Vec::new();
    let map = Array3::from_shape_fn(mask.dim(), |(z, h, w)| {
        if mask[(z, h, w)] == 0 {
            return false;
        }
        let outside = |p: Option<&u8>| p.map_or(true, |v| *v == 0);
        let on_surface = outside(mask.get((z.wrapping_sub(1), h, w)))
            || outside(mask.get((z + 1, h, w)))
            || outside(mask.get((z, h.wrapping_sub(1), w)))
            || outside(mask.get((z, h + 1, w)))
            || outside(mask.get((z, h, w.wrapping_sub(1))))
            || outside(mask.get((z, h, w + 1)));
        if on_surface {
            positions.push((z, h, w));
        }
        on_surface
    });
    (map, positions)
}

/// 每个体素到最近的 `feature` 体素的欧氏距离 (毫米). 没有任何 feature 时全为无穷大.
pub(crate) fn distance_transform(feature: &Array3<bool>, spacing: Spacing) -> Array3<f64> {
    let mut sq = feature.mapv(|f| if f { 0.0 } else { f64::INFINITY });
    let mut buf = Vec::new();
    let mut out = Vec::new();
    for axis in (0..3).rev() {
        for mut lane in sq.lanes_mut(Axis(axis)) {
            buf.clear();
            buf.extend(lane.iter().copied());
            out.resize(buf.len(), 0.0);
            squared_edt_1d(&buf, spacing[axis], &mut out);
            lane.iter_mut().zip(out.iter()).for_each(|(d, v)| *d = *v);
        }
    }
    sq.mapv_inplace(f64::sqrt);
    sq
}

/// 一维平方距离变换: `out[p] = min_q ((s·(p − q))² + f[q])`.
fn squared_edt_1d(f: &[f64], spacing: f64, out: &mut [f64]) {
    // 下包络中各抛物线的顶点与左边界.
    let mut v: Vec<usize> = Vec::with_capacity(f.len());
    let mut z: Vec<f64> = Vec::with_capacity(f.len());
    let x = |i: usize| i as f64 * spacing;

    for q in (0..f.len()).filter(|&q| f[q].is_finite()) {
        let mut s = f64::NEG_INFINITY;
        while let Some(&p) = v.last() {
            s = ((f[q] + x(q) * x(q)) - (f[p] + x(p) * x(p))) / (2.0 * (x(q) - x(p)));
            if v.len() > 1 && s <= z[z.len() - 1] {
                v.pop();
                z.pop();
            } else {
                break;
            }
        }
        v.push(q);
        z.push(s);
    }

    if v.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }
    let mut k = 0;
    for (p, o) in out.iter_mut().enumerate() {
        while k + 1 < z.len() && z[k + 1] < x(p) {
            k += 1;
        }
        let d = x(p) - x(v[k]);
        *o = d * d + f[v[k]];
    }
}

/// 线性插值百分位数. `values` 非空, 会被原地排序.
fn percentile(values: &mut [f64], q: f64) -> f64 {
    debug_assert!(!values.is_empty());
    values.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
