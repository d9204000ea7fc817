//! mask 水平切片视图及其二维操作 (4-邻接区域, 空洞填充).

mod core;
mod iter;

pub use self::core::{MaskSlice, MaskSliceMut};
pub(crate) use iter::PosIter;
