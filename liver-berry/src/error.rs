//! 运行时错误.

use std::path::PathBuf;
use thiserror::Error;

/// 流水线各阶段的运行时错误.
///
/// 任一阶段出错都会使整个调用失败, 不返回部分结果.
#[derive(Debug, Error)]
pub enum SegError {
    /// 输入路径既不是文件也不是目录.
    #[error("影像路径不存在: {0}")]
    NotFound(PathBuf),

    /// 序列目录中没有任何可解析的文件.
    #[error("目录中没有可解析的影像文件: {0}")]
    EmptySeries(PathBuf),

    /// 单个影像文件解析失败.
    #[error("无法解析影像文件 {path}: {reason}")]
    MalformedSlice {
        /// 出错的文件.
        path: PathBuf,
        /// 底层原因.
        reason: String,
    },

    /// 影像后端不可用, 且部署配置禁止回退到合成数据.
    #[error("影像后端不可用, 且合成数据回退已关闭")]
    BackendUnavailable,

    /// 序列中切片尺寸不一致.
    #[error("序列切片尺寸不一致: 期望 {expected:?}, 实际 {found:?} ({path})")]
    InconsistentSlices {
        /// 第一张切片的 (高, 宽).
        expected: (usize, usize),
        /// 当前切片的 (高, 宽).
        found: (usize, usize),
        /// 当前切片文件.
        path: PathBuf,
    },

    /// 两个三维数组形状不一致 (预测输出, 真值 mask 等).
    #[error("{what} 形状不一致: 期望 {expected:?}, 实际 {found:?}")]
    ShapeMismatch {
        /// 出错的对象.
        what: &'static str,
        /// 期望形状 (z, 高, 宽).
        expected: [usize; 3],
        /// 实际形状.
        found: Vec<usize>,
    },

    /// 体素分辨率必须全部为正数.
    #[error("体素分辨率必须为正: {0:?}")]
    InvalidSpacing([f64; 3]),

    /// 窗宽必须为正, 窗位必须有限.
    #[error("非法 CT 窗: 窗位 {center}, 窗宽 {width}")]
    InvalidWindow {
        /// 窗位.
        center: f32,
        /// 窗宽.
        width: f32,
    },

    /// 结果目录已存在. 不会覆写其它调用的结果.
    #[error("结果目录已存在: {0}")]
    ResultExists(PathBuf),

    /// 合成数据源参数非法.
    #[error("合成数据参数非法: {0}")]
    Synthetic(String),

    /// 预测能力内部错误.
    #[error("预测失败: {0}")]
    Predictor(String),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML 配置解析错误.
    #[error(transparent)]
    Config(#[from] toml::de::Error),

    /// 写入 npy 文件错误.
    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

/// 流水线运行结果.
pub type SegResult<T> = Result<T, SegError>;
