#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 将 3D 腹部 CT 扫描转换为可供临床解读的肝脏分割结果:
//! 二值肝脏 mask, 逐切片摘要, 定量质量指标以及持久化的结果文件.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 流水线
//!
//! ```text
//! 路径 / 原始体数据
//!   -> 加载 + 窗口归一化 (`loader`, `data::window`)
//!   -> 预测 (`predict::Predictor`, 外部能力)
//!   -> 后处理 (`post_proc`)
//!   -> { 指标 (`metrics`), 切片摘要 (`summary`) }
//!   -> 持久化 (`store`)
//!   -> `Segmentation`
//! ```
//!
//! 编排逻辑位于 [`pipeline::LiverSegmentation`].
//!
//! # 注意
//!
//! 1. 神经网络本身不在本 crate 范围内. 流水线只依赖 [`predict::Predictor`] trait:
//!   给定归一化体数据, 返回同形状的逐体素概率场.
//! 2. 阈值化 (0.5) 只在后处理阶段进行一次. `Predictor` 应返回连续值.
//! 3. DICOM 解析由 `dicom` feature 提供. 未开启时影像后端视为不可用,
//!   加载器会以 **警告** 级别日志回退到合成数据, 且 `Metadata::synthetic` 为 `true`.
//!
//! # 开发计划
//!
//! ### 窗口归一化 & HU 截断 ✅
//!
//! 实现位于 `liver-berry/src/data/window.rs`.
//!
//! ### 单文件 / 序列目录加载, NIfTI 与 DICOM 后端 ✅
//!
//! 实现位于 `liver-berry/src/loader`.
//!
//! ### 后处理: 小连通域去除, 空洞填充, 边界平滑 ✅
//!
//! 实现位于 `liver-berry/src/post_proc`.
//!
//! ### 重叠 / 分类 / 体积指标与临床分级 ✅
//!
//! 实现位于 `liver-berry/src/metrics`.
//!
//! ### 95% Hausdorff 距离 ✅
//!
//! 以物理单位 (毫米) 计算, 默认不启用.
//!
//! ### 重采样 ⌛️
//!
//! 目前只计算缩放因子, 不改变数据. 实现位于 `liver-berry/src/data/resample.rs`.
//!
//! ### 真正的轮廓提取 ⌛️
//!
//! 目前切片摘要只包含面积.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 体素分辨率, 以毫米为单位, 依次为 (z, 高, 宽).
pub type Spacing = [f64; 3];

type Predicate = fn(u8) -> bool;

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// 体数据, mask 与元信息等基础数据结构.
mod data;

pub use data::{resample, window, CtWindow, Mask, MaskSlice, MaskSliceMut, Metadata, Volume};

pub mod config;
pub mod consts;
mod error;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod post_proc;
pub mod predict;
pub mod prelude;
pub mod store;
pub mod summary;

pub use error::{SegError, SegResult};
