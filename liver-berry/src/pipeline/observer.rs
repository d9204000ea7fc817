//! 流水线状态通知.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 流水线阶段.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 从文件加载与归一化.
    Load,
    /// 对内存中的 HU 数据做窗口归一化.
    Preprocess,
    /// 模型预测.
    Predict,
    /// 后处理.
    Postprocess,
    /// 指标计算.
    Metrics,
    /// 切片摘要.
    Summarize,
    /// 持久化.
    Persist,
}

impl Stage {
    /// 阶段名称.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Preprocess => "preprocess",
            Self::Predict => "predict",
            Self::Postprocess => "postprocess",
            Self::Metrics => "metrics",
            Self::Summarize => "summarize",
            Self::Persist => "persist",
        }
    }
}

/// 流水线事件.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// 阶段开始.
    StageStarted {
        /// 结果 ID.
        result_id: String,
        /// 阶段.
        stage: Stage,
    },

    /// 阶段结束.
    StageFinished {
        /// 结果 ID.
        result_id: String,
        /// 阶段.
        stage: Stage,
        /// 耗时.
        elapsed: Duration,
    },

    /// 影像后端不可用, 使用了合成数据.
    SyntheticFallback {
        /// 结果 ID.
        result_id: String,
    },

    /// 结果已写入磁盘.
    Persisted {
        /// 结果 ID.
        result_id: String,
        /// 产物名 -> 路径.
        paths: BTreeMap<String, PathBuf>,
    },
}

/// 接收流水线事件.
pub trait PipelineObserver: Send + Sync {
    /// 处理一个事件. 不应阻塞太久.
    fn notify(&self, event: &PipelineEvent);
}

/// 默认观察者: 把事件转发到 `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn notify(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { result_id, stage } => {
                log::info!("[{result_id}] {} ...", stage.name());
            }
            PipelineEvent::StageFinished {
                result_id,
                stage,
                elapsed,
            } => {
                log::info!(
                    "[{result_id}] {} 完成, 耗时 {:.1} ms",
                    stage.name(),
                    elapsed.as_secs_f64() * 1000.0
                );
            }
            PipelineEvent::SyntheticFallback { result_id } => {
                log::warn!("[{result_id}] 使用合成数据, 结果不可用于临床!");
            }
            PipelineEvent::Persisted { result_id, paths } => {
                for (name, path) in paths.iter() {
                    log::info!("[{result_id}] {name}: {}", path.display());
                }
            }
        }
    }
}

/// 把事件记录在内存中的观察者. 克隆体共享同一份记录.
#[derive(Debug, Default, Clone)]
pub struct MemoryObserver {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl MemoryObserver {
    /// 创建空记录.
    pub fn new() -> Self {
        Self::default()
    }

    /// 目前为止记录的全部事件.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// 按顺序列出已结束的阶段.
    pub fn finished_stages(&self) -> Vec<Stage> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageFinished { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect()
    }
}

impl PipelineObserver for MemoryObserver {
    fn notify(&self, event: &PipelineEvent) {
        let mut events = match self.events.lock() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_observer_shared() {
        let obs = MemoryObserver::new();
        let handle = obs.clone();
        obs.notify(&PipelineEvent::StageStarted {
            result_id: "seg_x".to_string(),
            stage: Stage::Load,
        });
        obs.notify(&PipelineEvent::StageFinished {
            result_id: "seg_x".to_string(),
            stage: Stage::Load,
            elapsed: Duration::from_millis(3),
        });
        assert_eq!(handle.events().len(), 2);
        assert_eq!(handle.finished_stages(), [Stage::Load]);
        // 只是不应 panic.
        LogObserver.notify(&handle.events()[1]);
    }
}
