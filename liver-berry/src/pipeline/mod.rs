//! 推理编排: 加载 -> 预测 -> 后处理 -> 指标 -> 切片摘要 -> 持久化.
//!
//! 每次调用严格按顺序执行, 任一阶段失败则整个调用失败, 不返回部分结果.
//! 多个 [`LiverSegmentation`] 实例可以并发运行, 各自持有自己的预测器;
//! 它们共享的结果目录靠结果 ID 的唯一性隔离.

mod observer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ndarray::{Array3, ArrayView3};

use crate::config::{PipelineConfig, SummaryConfig};
use crate::loader::VolumeLoader;
use crate::metrics::{Metrics, MetricsEngine};
use crate::post_proc::Postprocessor;
use crate::predict::Predictor;
use crate::store::{generate_result_id, ResultStore};
use crate::summary::{summarize, SliceSummary};
use crate::{Mask, Metadata, SegError, SegResult, Spacing, Volume};

pub use observer::{LogObserver, MemoryObserver, PipelineEvent, PipelineObserver, Stage};

/// 一次推理的完整结果.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// 结果 ID, 形如 `seg_0123456789ab`.
    pub result_id: String,

    /// 后处理后的二值 mask.
    pub mask: Mask,

    /// 逐切片摘要.
    pub slices: SliceSummary,

    /// 指标.
    pub metrics: Metrics,

    /// 模型预测耗时, 毫秒.
    pub inference_time_ms: f64,

    /// 整个调用耗时, 毫秒.
    pub total_time_ms: f64,

    /// 产物名 -> 路径. 未持久化时为空.
    pub output_paths: BTreeMap<String, PathBuf>,

    /// 扫描元信息.
    pub metadata: Metadata,
}

/// 肝脏分割流水线.
pub struct LiverSegmentation {
    loader: VolumeLoader,
    predictor: Box<dyn Predictor>,
    postprocessor: Postprocessor,
    metrics: MetricsEngine,
    summary: SummaryConfig,
    store: ResultStore,
    observer: Box<dyn PipelineObserver>,
}

impl LiverSegmentation {
    /// 使用默认组件, 结果写入 `output_dir`.
    pub fn new<P: Into<PathBuf>>(predictor: Box<dyn Predictor>, output_dir: P) -> Self {
        Self {
            loader: VolumeLoader::detect(),
            predictor,
            postprocessor: Postprocessor::default(),
            metrics: MetricsEngine::default(),
            summary: SummaryConfig::default(),
            store: ResultStore::new(output_dir),
            observer: Box::new(LogObserver),
        }
    }

    /// 按配置构建. 影像后端由编译时开启的 feature 决定.
    pub fn from_config(cfg: &PipelineConfig, predictor: Box<dyn Predictor>) -> Self {
        let loader = VolumeLoader::detect()
            .window(cfg.window)
            .target_spacing(cfg.target_spacing)
            .synthetic(cfg.synthetic.clone())
            .allow_synthetic_fallback(cfg.allow_synthetic_fallback);
        Self {
            loader,
            predictor,
            postprocessor: Postprocessor::from_config(&cfg.postprocess),
            metrics: MetricsEngine::from_config(cfg.clinical, &cfg.metrics),
            summary: cfg.summary,
            store: ResultStore::new(cfg.output_dir.clone()),
            observer: Box::new(LogObserver),
        }
    }

    /// 替换加载器.
    #[inline]
    pub fn with_loader(mut self, loader: VolumeLoader) -> Self {
        self.loader = loader;
        self
    }

    /// 替换后处理器.
    #[inline]
    pub fn with_postprocessor(mut self, postprocessor: Postprocessor) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// 替换指标引擎.
    #[inline]
    pub fn with_metrics_engine(mut self, metrics: MetricsEngine) -> Self {
        self.metrics = metrics;
        self
    }

    /// 设置切片摘要参数.
    #[inline]
    pub fn with_summary(mut self, summary: SummaryConfig) -> Self {
        self.summary = summary;
        self
    }

    /// 替换事件观察者.
    #[inline]
    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 结果目录树.
    #[inline]
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// 对文件或序列目录执行完整流程并持久化结果.
    ///
    /// 提供 `ground_truth` 时计算全部指标, 否则只计算体积指标.
    pub fn segment_from_dicom<P: AsRef<Path>>(
        &mut self,
        path: P,
        ground_truth: Option<ArrayView3<'_, u8>>,
    ) -> SegResult<Segmentation> {
        let start = Instant::now();
        let path = path.as_ref();
        let id = generate_result_id();
        let obs = self.observer.as_ref();
        log::info!("[{id}] 开始处理 {}", path.display());

        let ((volume, metadata), _) = run_stage(obs, &id, Stage::Load, || self.loader.load(path))?;
        if metadata.synthetic {
            obs.notify(&PipelineEvent::SyntheticFallback {
                result_id: id.clone(),
            });
        }

        let (probability, inference) = run_stage(obs, &id, Stage::Predict, || {
            predict_checked(self.predictor.as_mut(), &volume)
        })?;
        drop(volume);
        let (mask, _) = run_stage(obs, &id, Stage::Postprocess, || {
            Ok(self.postprocessor.process(probability.view()))
        })?;
        drop(probability);

        let (metrics, _) = run_stage(obs, &id, Stage::Metrics, || {
            self.metrics.evaluate(&mask, ground_truth, metadata.spacing)
        })?;
        let (slices, _) = run_stage(obs, &id, Stage::Summarize, || {
            Ok(summarize(&mask, self.summary.num_slices))
        })?;
        let (output_paths, _) = run_stage(obs, &id, Stage::Persist, || {
            self.store.persist(&id, &mask, &slices, &metrics)
        })?;
        obs.notify(&PipelineEvent::Persisted {
            result_id: id.clone(),
            paths: output_paths.clone(),
        });

        Ok(Segmentation {
            result_id: id,
            mask,
            slices,
            metrics,
            inference_time_ms: millis(inference),
            total_time_ms: millis(start.elapsed()),
            output_paths,
            metadata,
        })
    }

    /// 对内存中以 HU 为单位的体数据执行流程, 不持久化.
    ///
    /// 只计算体积指标. `total_time_ms` 覆盖归一化, 预测与后处理.
    pub fn segment_from_array(
        &mut self,
        hu: ArrayView3<'_, f32>,
        spacing: Spacing,
    ) -> SegResult<Segmentation> {
        let start = Instant::now();
        let id = generate_result_id();
        let obs = self.observer.as_ref();
        let window = self.loader.current_window();
        let metadata = Metadata {
            window_center: window.level(),
            window_width: window.width(),
            ..Metadata::with_spacing(hu.dim(), spacing)?
        };

        let (volume, _) = run_stage(obs, &id, Stage::Preprocess, || {
            Ok(Volume::from_hu(hu, &window))
        })?;
        let (probability, inference) = run_stage(obs, &id, Stage::Predict, || {
            predict_checked(self.predictor.as_mut(), &volume)
        })?;
        let (mask, _) = run_stage(obs, &id, Stage::Postprocess, || {
            Ok(self.postprocessor.process(probability.view()))
        })?;
        let total = start.elapsed();

        let (metrics, _) = run_stage(obs, &id, Stage::Metrics, || {
            self.metrics.evaluate(&mask, None, spacing)
        })?;
        let (slices, _) = run_stage(obs, &id, Stage::Summarize, || {
            Ok(summarize(&mask, self.summary.num_slices))
        })?;

        Ok(Segmentation {
            result_id: id,
            mask,
            slices,
            metrics,
            inference_time_ms: millis(inference),
            total_time_ms: millis(total),
            output_paths: BTreeMap::new(),
            metadata,
        })
    }
}

/// 执行一个阶段并通知观察者. 失败时不发送结束事件.
fn run_stage<T, F>(
    observer: &dyn PipelineObserver,
    result_id: &str,
    stage: Stage,
    f: F,
) -> SegResult<(T, Duration)>
where
    F: FnOnce() -> SegResult<T>,
{
    observer.notify(&PipelineEvent::StageStarted {
        result_id: result_id.to_string(),
        stage,
    });
    let start = Instant::now();
    let out = f().map_err(|e| {
        log::error!("[{result_id}] {} 失败: {e}", stage.name());
        e
    })?;
    let elapsed = start.elapsed();
    observer.notify(&PipelineEvent::StageFinished {
        result_id: result_id.to_string(),
        stage,
        elapsed,
    });
    Ok((out, elapsed))
}

/// 调用预测器并检查输出形状.
fn predict_checked(predictor: &mut dyn Predictor, volume: &Volume) -> SegResult<Array3<f32>> {
    let out = predictor.predict(volume.data())?;
    let (z, h, w) = volume.shape();
    if out.shape() != [z, h, w] {
        return Err(SegError::ShapeMismatch {
            what: "预测输出",
            expected: [z, h, w],
            found: out.shape().to_vec(),
        });
    }
    Ok(out)
}

#[inline]
fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::TextBackend;
    use crate::post_proc::PostprocessConfig;
    use crate::predict::FnPredictor;
    use ndarray::s;
    use std::sync::Arc;

    /// 以归一化强度直接作为概率.
    fn identity_predictor() -> Box<dyn Predictor> {
        Box::new(FnPredictor::new("identity", |v: ArrayView3<f32>| {
            Ok(v.to_owned())
        }))
    }

    /// 不做边界平滑, 立方体的棱角会被开运算削掉.
    fn small_postprocessor() -> Postprocessor {
        Postprocessor::from_config(&PostprocessConfig {
            min_volume_voxels: 8,
            smoothing: false,
            ..PostprocessConfig::default()
        })
    }

    /// 中心 4x4x4 为 80 HU (归一化后 0.6), 其余为 -1000 HU.
    fn hu_cube() -> Array3<f32> {
        let mut hu = Array3::from_elem((8, 8, 8), -1000.0f32);
        hu.slice_mut(s![2..6, 2..6, 2..6]).fill(80.0);
        hu
    }

    #[test]
    fn test_from_array() {
        let tmp = tempfile::tempdir().unwrap();
        let observer = MemoryObserver::new();
        let mut seg = LiverSegmentation::new(identity_predictor(), tmp.path())
            .with_postprocessor(small_postprocessor())
            .with_observer(Box::new(observer.clone()));
        let r = seg.segment_from_array(hu_cube().view(), [2.0, 1.0, 1.0]).unwrap();

        assert!(r.result_id.starts_with("seg_"));
        assert_eq!(r.mask.count_foreground(), 64);
        assert_eq!(r.metrics.volume.voxel_count, 64);
        assert_eq!(r.metrics.volume.volume_mm3, 128.0);
        assert!(!r.metrics.has_ground_truth());
        assert_eq!(r.slices.len(), 4);
        assert!(r.output_paths.is_empty());
        assert_eq!(r.metadata.spacing, [2.0, 1.0, 1.0]);
        assert!(r.inference_time_ms <= r.total_time_ms);
        // 不持久化.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(
            observer.finished_stages(),
            [
                Stage::Preprocess,
                Stage::Predict,
                Stage::Postprocess,
                Stage::Metrics,
                Stage::Summarize
            ]
        );
    }

    #[test]
    fn test_from_array_invalid_spacing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut seg = LiverSegmentation::new(identity_predictor(), tmp.path());
        let r = seg.segment_from_array(hu_cube().view(), [0.0, 1.0, 1.0]);
        assert!(matches!(r, Err(SegError::InvalidSpacing(_))));
    }

    #[test]
    fn test_predictor_shape_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = FnPredictor::new("bad", |_: ArrayView3<f32>| Ok(Array3::zeros((1, 1, 1))));
        let mut seg = LiverSegmentation::new(Box::new(bad), tmp.path());
        let r = seg.segment_from_array(hu_cube().view(), [1.0; 3]);
        assert!(matches!(r, Err(SegError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_from_file_with_ground_truth() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("scan.txt");
        // 全体 240 HU -> 归一化 1.0 -> 全部为肝脏.
        std::fs::write(&input, "3 4 4 240").unwrap();

        let observer = MemoryObserver::new();
        let mut seg = LiverSegmentation::new(identity_predictor(), tmp.path().join("out"))
            .with_loader(VolumeLoader::with_backend(Arc::new(TextBackend)))
            .with_postprocessor(small_postprocessor())
            .with_observer(Box::new(observer.clone()));
        let gt = Array3::<u8>::ones((3, 4, 4));
        let r = seg.segment_from_dicom(&input, Some(gt.view())).unwrap();

        let overlap = r.metrics.overlap.unwrap();
        assert!((overlap.dice - 1.0).abs() < 1e-6);
        assert_eq!(overlap.pixel_accuracy, 1.0);
        assert!(r.metrics.clinical.unwrap().meets_clinical_standards);
        assert_eq!(r.metadata.patient_id, "P001");
        assert_eq!(r.output_paths.len(), 3);
        assert!(r.output_paths.values().all(|p| p.is_file()));
        assert!(r.output_paths["mask_npy"].starts_with(seg.store().result_dir(&r.result_id)));
        assert_eq!(observer.finished_stages().last(), Some(&Stage::Persist));
        assert!(observer
            .events()
            .iter()
            .all(|e| !matches!(e, PipelineEvent::SyntheticFallback { .. })));
    }

    #[test]
    fn test_ground_truth_shape_mismatch_persists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("scan.txt");
        std::fs::write(&input, "3 4 4 240").unwrap();
        let out = tmp.path().join("out");
        let mut seg = LiverSegmentation::new(identity_predictor(), &out)
            .with_loader(VolumeLoader::with_backend(Arc::new(TextBackend)))
            .with_postprocessor(small_postprocessor());
        let gt = Array3::<u8>::ones((2, 4, 4));
        let r = seg.segment_from_dicom(&input, Some(gt.view()));
        assert!(matches!(r, Err(SegError::ShapeMismatch { .. })));
        assert!(!out.exists());
    }
}
