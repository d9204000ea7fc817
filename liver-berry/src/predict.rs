//! 预测能力.
//!
//! 神经网络本身不在本 crate 范围内. 流水线只要求一个 [`Predictor`]:
//! 给定窗口归一化后的体数据, 返回同形状的逐体素肝脏概率场.
//! 概率场应是连续值, 阈值化由后处理阶段完成.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::{SegError, SegResult};

/// 体数据 -> 概率场.
pub trait Predictor: Send {
    /// 预测器名称, 用于日志.
    fn name(&self) -> &'static str;

    /// 同步执行一次预测. 返回值的形状必须与 `volume` 相同.
    fn predict(&mut self, volume: ArrayView3<'_, f32>) -> SegResult<Array3<f32>>;
}

/// 计算设备.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// CPU.
    #[default]
    Cpu,

    /// 第 `n` 块 CUDA 设备.
    Cuda(usize),
}

impl FromStr for Device {
    type Err = SegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| SegError::Predictor(format!("无法识别的设备: {s}"))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(n) => write!(f, "cuda:{n}"),
        }
    }
}

/// 基线预测器: 对归一化强度做 logistic 响应, `p = 1 / (1 + exp(-gain * (v - center)))`.
///
/// 不是真正的分割模型, 只用于在没有外部模型时跑通流水线. 仅支持 CPU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityPredictor {
    /// 概率为 0.5 的归一化强度.
    pub center: f32,

    /// 响应陡峭程度, 必须为正.
    pub gain: f32,
}

impl Default for IntensityPredictor {
    fn default() -> Self {
        Self {
            center: 0.4,
            gain: 20.0,
        }
    }
}

impl IntensityPredictor {
    /// 构建预测器, 检查参数合法性.
    pub fn new(center: f32, gain: f32) -> SegResult<Self> {
        if center.is_finite() && gain.is_finite() && gain > 0.0 {
            Ok(Self { center, gain })
        } else {
            Err(SegError::Predictor(format!(
                "非法参数: center = {center}, gain = {gain}"
            )))
        }
    }

    /// 从 JSON 权重文件 (`{"center": .., "gain": ..}`) 加载.
    pub fn from_weights<P: AsRef<Path>>(path: P) -> SegResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SegError::NotFound(path.to_path_buf()));
        }
        let raw: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        log::info!("已加载权重 {}", path.display());
        Self::new(raw.center, raw.gain)
    }

    /// 单个体素的响应.
    #[inline]
    pub fn eval(&self, v: f32) -> f32 {
        1.0 / (1.0 + (-self.gain * (v - self.center)).exp())
    }
}

impl Predictor for IntensityPredictor {
    fn name(&self) -> &'static str {
        "intensity"
    }

    fn predict(&mut self, volume: ArrayView3<'_, f32>) -> SegResult<Array3<f32>> {
        Ok(volume.mapv(|v| self.eval(v)))
    }
}

/// 用闭包实现的预测器.
pub struct FnPredictor<F> {
    name: &'static str,
    f: F,
}

impl<F> FnPredictor<F>
where
    F: FnMut(ArrayView3<'_, f32>) -> SegResult<Array3<f32>> + Send,
{
    /// 包装闭包 `f`.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: FnMut(ArrayView3<'_, f32>) -> SegResult<Array3<f32>> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn predict(&mut self, volume: ArrayView3<'_, f32>) -> SegResult<Array3<f32>> {
        (self.f)(volume)
    }
}

/// 根据权重文件与设备构建默认预测器.
///
/// `weights` 为 `None` 时使用基线参数. 请求非 CPU 设备时记录警告并回退到 CPU.
pub fn create_predictor(
    weights: Option<&Path>,
    device: Device,
) -> SegResult<Box<dyn Predictor>> {
    if device != Device::Cpu {
        log::warn!("基线预测器只支持 cpu, 忽略设备 {device}");
    }
    let predictor = match weights {
        Some(p) => IntensityPredictor::from_weights(p)?,
        None => {
            log::warn!("未提供模型权重, 使用未经训练的基线参数");
            IntensityPredictor::default()
        }
    };
    Ok(Box::new(predictor))
}
