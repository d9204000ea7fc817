//! 逐切片摘要.
//!
//! 只记录每个采样切片的肝脏面积, 不做几何轮廓追踪.

use serde::{Deserialize, Serialize};

use crate::Mask;

/// 摘要格式标记. 固定为 `"json"`.
pub const SUMMARY_FORMAT: &str = "json";

/// 单个切片的摘要.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRecord {
    /// 切片在深度方向的索引.
    pub slice_index: usize,

    /// 切片中是否有肝脏. 被记录的切片总为 `true`.
    pub has_liver: bool,

    /// 切片中肝脏像素个数.
    pub liver_area: usize,
}

/// 整个 mask 的切片摘要, 按切片索引升序排列.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSummary {
    /// 格式标记.
    pub format: String,

    /// 含有肝脏的采样切片.
    pub slices: Vec<SliceRecord>,
}

impl SliceSummary {
    /// 记录个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// 是否没有任何记录?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// 所有记录的面积之和.
    #[inline]
    pub fn total_area(&self) -> usize {
        self.slices.iter().map(|r| r.liver_area).sum()
    }
}

/// 对 `mask` 按步长 `max(1, depth / num_slices)` 采样切片, 跳过没有肝脏的切片.
///
/// `num_slices` 为 `None` 或 0 时等同于 `depth`, 即检查每一层.
pub fn summarize(mask: &Mask, num_slices: Option<usize>) -> SliceSummary {
    let depth = mask.len_z();
    let wanted = match num_slices {
        Some(n) if n > 0 => n,
        _ => depth,
    };
    let stride = (depth / wanted.max(1)).max(1);

    let slices = mask
        .slice_iter()
        .enumerate()
        .step_by(stride)
        .filter_map(|(z, slice)| {
            let liver_area = slice.liver_area();
            (liver_area > 0).then_some(SliceRecord {
                slice_index: z,
                has_liver: true,
                liver_area,
            })
        })
        .collect();
    SliceSummary {
        format: SUMMARY_FORMAT.to_string(),
        slices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::gray::MASK_LIVER;
    use ndarray::{s, Array3};

    fn mask() -> Mask {
        let mut data = Array3::<u8>::zeros((10, 4, 4));
        for z in 2..8 {
            data.slice_mut(s![z, 0..2, 0..(z % 4 + 1)]).fill(MASK_LIVER);
        }
        Mask::from_raw(data)
    }

    #[test]
    fn test_every_slice() {
        let s = summarize(&mask(), None);
        assert_eq!(s.format, "json");
        let idx: Vec<_> = s.slices.iter().map(|r| r.slice_index).collect();
        assert_eq!(idx, [2, 3, 4, 5, 6, 7]);
        assert!(s.slices.iter().all(|r| r.has_liver));
        assert_eq!(s.slices[0].liver_area, 2 * 3);
        assert_eq!(s.total_area(), mask().count_foreground());
        assert_eq!(summarize(&mask(), Some(0)), s);
    }

    #[test]
    fn test_stride() {
        // 10 / 3 = 3, 采样 0, 3, 6, 9.
        let s = summarize(&mask(), Some(3));
        let idx: Vec<_> = s.slices.iter().map(|r| r.slice_index).collect();
        assert_eq!(idx, [3, 6]);
        // 请求的切片数多于深度时步长为 1.
        assert_eq!(summarize(&mask(), Some(100)).len(), 6);
    }

    #[test]
    fn test_empty_mask() {
        let s = summarize(&Mask::zeros((3, 2, 2)), None);
        assert!(s.is_empty());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json, serde_json::json!({"format": "json", "slices": []}));
    }
}
