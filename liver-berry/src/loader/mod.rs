//! 体数据加载: 单文件 / 序列目录分派, 元信息提取与合成数据回退.
//!
//! 加载器本身不解析任何影像格式. 具体格式由 [`ImageBackend`] 提供,
//! 目前有 NIfTI 和 DICOM (需开启 `dicom` feature) 两种实现.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array3, Axis};

use crate::data::meta::check_spacing;
use crate::data::resample::resample;
use crate::{CtWindow, Idx2d, Metadata, SegError, SegResult, Spacing, Volume};

cfg_if::cfg_if! {
    if #[cfg(feature = "dicom")] {
        mod dcm;

        pub use dcm::DicomBackend;
    }
}
mod nii;
mod synthetic;

pub use nii::NiftiBackend;
pub use synthetic::SyntheticVolume;

/// 影像后端解析单个文件得到的数据.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// 以 HU 为单位的帧数据, 按 (帧, 高, 宽) 组织. 单帧文件的第一维为 1.
    pub frames: Array3<f32>,

    /// 从文件头提取的元信息. 缺失字段取 [`Metadata::default`] 中的值.
    pub meta: Metadata,

    /// 文件头中记录的窗位/窗宽 (若有).
    pub window: Option<CtWindow>,
}

/// 影像格式后端.
pub trait ImageBackend: Send + Sync {
    /// 后端名称, 用于日志.
    fn name(&self) -> &'static str;

    /// 快速判断 `path` 是否可能是本后端能解析的文件. 不应完整解析文件.
    fn probe(&self, path: &Path) -> bool;

    /// 解析单个文件. 失败时应返回 [`SegError::MalformedSlice`].
    ///
    /// 返回的帧数据应已应用线性重标定 (`raw * slope + intercept`, 若文件中有).
    fn read(&self, path: &Path) -> SegResult<Dataset>;
}

/// 体数据加载器.
///
/// 路径是文件时按单个数据集解析; 是目录时把其中每个可解析文件视为一张切片,
/// 按文件名排序后沿深度方向堆叠. 无可用后端时回退到 [`SyntheticVolume`].
pub struct VolumeLoader {
    backends: Vec<Arc<dyn ImageBackend>>,
    synthetic: SyntheticVolume,
    window: CtWindow,
    target_spacing: Spacing,
    allow_synthetic_fallback: bool,
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self::detect()
    }
}

impl VolumeLoader {
    /// 根据编译时开启的 feature 构建加载器.
    ///
    /// NIfTI 后端总是可用; 开启 `dicom` 时 DICOM 后端排在它之前.
    pub fn detect() -> Self {
        let mut backends: Vec<Arc<dyn ImageBackend>> = Vec::with_capacity(2);
        cfg_if::cfg_if! {
            if #[cfg(feature = "dicom")] {
                backends.push(Arc::new(DicomBackend));
            } else {
                log::debug!("未开启 `dicom` feature, 仅支持 NIfTI");
            }
        }
        backends.push(Arc::new(NiftiBackend));
        Self::with_backends(backends)
    }

    /// 已注册后端的名称, 按选择优先级排列.
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// 仅使用给定后端.
    #[inline]
    pub fn with_backend(backend: Arc<dyn ImageBackend>) -> Self {
        Self::with_backends(vec![backend])
    }

    /// 使用给定后端列表. 解析文件时选择第一个 `probe` 成功的后端.
    pub fn with_backends(backends: Vec<Arc<dyn ImageBackend>>) -> Self {
        Self {
            backends,
            synthetic: SyntheticVolume::default(),
            window: CtWindow::from_liver(),
            target_spacing: crate::consts::DEFAULT_TARGET_SPACING,
            allow_synthetic_fallback: true,
        }
    }

    /// 不带任何影像后端. 加载时总是回退 (或在禁止回退时报错).
    #[inline]
    pub fn without_backend() -> Self {
        Self::with_backends(Vec::new())
    }

    /// 设置归一化使用的 CT 窗.
    #[inline]
    pub fn window(mut self, window: CtWindow) -> Self {
        self.window = window;
        self
    }

    /// 设置重采样目标分辨率.
    #[inline]
    pub fn target_spacing(mut self, spacing: Spacing) -> Self {
        self.target_spacing = spacing;
        self
    }

    /// 设置合成数据源.
    #[inline]
    pub fn synthetic(mut self, synthetic: SyntheticVolume) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// 设置是否允许在后端不可用时回退到合成数据.
    #[inline]
    pub fn allow_synthetic_fallback(mut self, allow: bool) -> Self {
        self.allow_synthetic_fallback = allow;
        self
    }

    /// 是否注册了至少一个影像后端?
    #[inline]
    pub fn has_backend(&self) -> bool {
        !self.backends.is_empty()
    }

    /// 当前使用的 CT 窗.
    #[inline]
    pub fn current_window(&self) -> CtWindow {
        self.window
    }

    /// 加载 `path` 并完成窗口归一化.
    ///
    /// # 错误
    ///
    /// - `path` 既不是文件也不是目录: [`SegError::NotFound`].
    /// - 目录中没有任何可解析文件: [`SegError::EmptySeries`].
    /// - 单个文件无法解析: [`SegError::MalformedSlice`].
    /// - 无可用后端且禁止回退: [`SegError::BackendUnavailable`].
    pub fn load<P: AsRef<Path>>(&self, path: P) -> SegResult<(Volume, Metadata)> {
        let path = path.as_ref();
        if !path.is_file() && !path.is_dir() {
            return Err(SegError::NotFound(path.to_path_buf()));
        }
        if self.backends.is_empty() {
            return self.fallback(path);
        }

        let dataset = if path.is_dir() {
            self.read_series(path)?
        } else {
            self.read_single(path)?
        };
        self.preprocess(dataset)
    }

    /// 解析单个文件, 不做归一化.
    pub fn read_single(&self, path: &Path) -> SegResult<Dataset> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.probe(path))
            .ok_or_else(|| SegError::MalformedSlice {
                path: path.to_path_buf(),
                reason: "没有能识别该文件的影像后端".to_string(),
            })?;
        log::debug!("使用 {} 后端解析 {}", backend.name(), path.display());
        backend.read(path)
    }

    /// 解析序列目录, 不做归一化.
    ///
    /// 目录中的文件按文件名排序; 无法解析的文件被跳过并记录警告.
    /// 元信息取自第一个成功解析的文件.
    pub fn read_series(&self, dir: &Path) -> SegResult<Dataset> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut head: Option<(Metadata, Option<CtWindow>, Idx2d)> = None;
        let mut stack = Vec::with_capacity(files.len());
        for file in files.iter() {
            let dataset = match self.read_single(file) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("跳过无法解析的文件 {}: {}", file.display(), e);
                    continue;
                }
            };
            let (_, h, w) = dataset.frames.dim();
            match &head {
                Some((_, _, expected)) if *expected != (h, w) => {
                    return Err(SegError::InconsistentSlices {
                        expected: *expected,
                        found: (h, w),
                        path: file.clone(),
                    });
                }
                Some(_) => {}
                None => head = Some((dataset.meta, dataset.window, (h, w))),
            }
            stack.push(dataset.frames);
        }

        let Some((meta, window, _)) = head else {
            return Err(SegError::EmptySeries(dir.to_path_buf()));
        };
        log::info!("序列 {} 共解析 {}/{} 个文件", dir.display(), stack.len(), files.len());

        let views: Vec<_> = stack.iter().map(|a| a.view()).collect();
        let frames =
            ndarray::concatenate(Axis(0), &views).map_err(|e| SegError::MalformedSlice {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Dataset {
            frames,
            meta,
            window,
        })
    }

    /// 重采样并窗口归一化. 元信息中的窗口取文件头中的值, 缺失时取加载器配置.
    fn preprocess(&self, dataset: Dataset) -> SegResult<(Volume, Metadata)> {
        let Dataset {
            frames,
            mut meta,
            window,
        } = dataset;
        check_spacing(meta.spacing)?;
        let recorded = window.unwrap_or(self.window);
        meta.window_center = recorded.level();
        meta.window_width = recorded.width();

        let hu = resample(frames, meta.spacing, self.target_spacing)?;
        let volume = Volume::from_hu(hu.view(), &self.window);
        log::info!(
            "加载完成: 形状 {:?}, 分辨率 {:?} mm, 患者 {}",
            volume.shape(),
            meta.spacing,
            meta.patient_id
        );
        Ok((volume, meta))
    }

    /// 后端不可用时的回退路径.
    fn fallback(&self, path: &Path) -> SegResult<(Volume, Metadata)> {
        if !self.allow_synthetic_fallback {
            return Err(SegError::BackendUnavailable);
        }
        log::warn!(
            "影像后端不可用, 使用合成数据代替 {}. 结果不可用于临床!",
            path.display()
        );
        let data = self.synthetic.generate()?;
        let (_, rows, columns) = data.dim();
        let meta = Metadata {
            rows,
            columns,
            window_center: self.window.level(),
            window_width: self.window.width(),
            ..Metadata::synthetic()
        };
        Ok((Volume::new(data), meta))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// 测试用后端: 解析 `.txt` 文件, 内容为 `帧数 高 宽 HU值 [窗位 窗宽]`.
    pub(crate) struct TextBackend;

    impl ImageBackend for TextBackend {
        fn name(&self) -> &'static str {
            "text"
        }

        fn probe(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == "txt")
        }

        fn read(&self, path: &Path) -> SegResult<Dataset> {
            let malformed = |reason: &str| SegError::MalformedSlice {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            };
            let text = fs::read_to_string(path)?;
            let nums: Vec<f32> = text
                .split_whitespace()
                .map(|s| s.parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed("非数字"))?;
            let (shape, value) = match nums.as_slice() {
                [d, h, w, v, ..] => ((*d as usize, *h as usize, *w as usize), *v),
                _ => return Err(malformed("字段不足")),
            };
            let window = match nums.as_slice() {
                [_, _, _, _, c, w] => Some(CtWindow::new(*c, *w)?),
                _ => None,
            };
            Ok(Dataset {
                frames: Array3::from_elem(shape, value),
                meta: Metadata {
                    patient_id: "P001".to_string(),
                    rows: shape.1,
                    columns: shape.2,
                    spacing: [2.5, 0.8, 0.8],
                    ..Metadata::default()
                },
                window,
            })
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn text_loader() -> VolumeLoader {
        VolumeLoader::with_backend(Arc::new(TextBackend))
    }

    fn small_synthetic() -> SyntheticVolume {
        SyntheticVolume {
            shape: (6, 9, 9),
            seed: Some(7),
            ..SyntheticVolume::default()
        }
    }

    #[test]
    fn test_not_found() {
        let loader = text_loader();
        let r = loader.load("/definitely/not/here.txt");
        assert!(matches!(r, Err(SegError::NotFound(_))));
        // 无后端时也先检查路径.
        let r = VolumeLoader::without_backend().load("/definitely/not/here.txt");
        assert!(matches!(r, Err(SegError::NotFound(_))));
    }

    #[test]
    fn test_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "readme.md", "not an image");
        let r = text_loader().load(dir.path());
        assert!(matches!(r, Err(SegError::EmptySeries(_))));
    }

    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "2 3 4 40 60 200");
        let (volume, meta) = text_loader().load(dir.path().join("a.txt")).unwrap();
        assert_eq!(volume.shape(), (2, 3, 4));
        // 归一化总是使用加载器的窗 (40/400).
        assert!((volume[(0, 0, 0)] - 0.5).abs() < 1e-6);
        // 元信息记录文件头的窗.
        assert_eq!((meta.window_center, meta.window_width), (60.0, 200.0));
        assert_eq!(meta.patient_id, "P001");
        assert!(!meta.synthetic);
    }

    #[test]
    fn test_single_file_malformed_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "oops");
        let r = text_loader().load(dir.path().join("a.txt"));
        assert!(matches!(r, Err(SegError::MalformedSlice { .. })));
    }

    #[test]
    fn test_series_sorted_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "02.txt", "1 2 2 240");
        write(dir.path(), "01.txt", "1 2 2 -160");
        write(dir.path(), "03.txt", "broken");
        write(dir.path(), "notes.md", "skip me");
        let (volume, meta) = text_loader().load(dir.path()).unwrap();
        assert_eq!(volume.shape(), (2, 2, 2));
        assert_eq!(volume[(0, 0, 0)], 0.0);
        assert_eq!(volume[(1, 0, 0)], 1.0);
        assert_eq!(meta.spacing, [2.5, 0.8, 0.8]);
        // 文件头中没有窗, 记录加载器的窗.
        assert_eq!((meta.window_center, meta.window_width), (40.0, 400.0));
    }

    #[test]
    fn test_series_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "01.txt", "1 2 2 0");
        write(dir.path(), "02.txt", "1 3 2 0");
        let r = text_loader().load(dir.path());
        assert!(matches!(
            r,
            Err(SegError::InconsistentSlices {
                expected: (2, 2),
                found: (3, 2),
                ..
            })
        ));
    }

    #[test]
    fn test_fallback_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let loader = VolumeLoader::without_backend().synthetic(small_synthetic());
        assert!(!loader.has_backend());
        let (volume, meta) = loader.load(dir.path()).unwrap();
        assert_eq!(volume.shape(), (6, 9, 9));
        assert!(meta.synthetic);
        assert_eq!(meta.patient_id, "MOCK_PATIENT");
        assert_eq!((meta.rows, meta.columns), (9, 9));
    }

    #[test]
    fn test_fallback_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let loader = VolumeLoader::without_backend()
            .synthetic(small_synthetic())
            .allow_synthetic_fallback(false);
        assert!(matches!(
            loader.load(dir.path()),
            Err(SegError::BackendUnavailable)
        ));
    }

    #[test]
    fn test_detect_always_has_nifti() {
        let loader = VolumeLoader::detect();
        assert!(loader.has_backend());
        let names = loader.backend_names();
        assert_eq!(names.last(), Some(&"nifti"));
        assert_eq!(names.contains(&"dicom"), cfg!(feature = "dicom"));
    }

    #[test]
    fn test_detect_routes_nifti_files() {
        let dir = tempfile::tempdir().unwrap();
        // 扩展名匹配但内容损坏: 交给 NIfTI 后端解析而不是回退.
        write(dir.path(), "scan.nii", "not a nifti header");
        let r = VolumeLoader::detect().load(dir.path().join("scan.nii"));
        assert!(matches!(r, Err(SegError::MalformedSlice { .. })));
    }
}
