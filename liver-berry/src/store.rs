//! 结果持久化.
//!
//! 每次调用写入 `<root>/<result_id>/` 目录:
//!
//! - `mask.npy`: 二值 mask, `u8`, 形状 (z, 高, 宽);
//! - `contours.json`: 逐切片摘要;
//! - `metrics.json`: 扁平的指标对象.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray_npy::write_npy;
use serde::Serialize;
use uuid::Uuid;

use crate::consts::RESULT_ID_PREFIX;
use crate::metrics::Metrics;
use crate::summary::SliceSummary;
use crate::{Mask, SegError, SegResult};

/// mask 文件名.
pub const MASK_FILE: &str = "mask.npy";

/// 切片摘要文件名.
pub const CONTOURS_FILE: &str = "contours.json";

/// 指标文件名.
pub const METRICS_FILE: &str = "metrics.json";

/// 生成新的结果 ID: `seg_` 加 12 个小写十六进制字符.
pub fn generate_result_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{RESULT_ID_PREFIX}{}", &hex[..12])
}

/// 结果目录树.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// 以 `root` 为根目录. 目录在第一次持久化时才创建.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 结果 `result_id` 所在目录.
    #[inline]
    pub fn result_dir(&self, result_id: &str) -> PathBuf {
        self.root.join(result_id)
    }

    /// 写入一次推理的全部结果, 返回 `产物名 -> 路径`:
    /// `mask_npy`, `contours_json`, `metrics_json`.
    ///
    /// 结果目录已存在时返回 [`SegError::ResultExists`], 不写入任何文件.
    /// 任一文件写入失败时删除本次创建的结果目录, 该 ID 之后仍可使用.
    pub fn persist(
        &self,
        result_id: &str,
        mask: &Mask,
        summary: &SliceSummary,
        metrics: &Metrics,
    ) -> SegResult<BTreeMap<String, PathBuf>> {
        self.persist_artifacts(result_id, mask, summary, metrics)
    }

    fn persist_artifacts<S: Serialize, M: Serialize>(
        &self,
        result_id: &str,
        mask: &Mask,
        summary: &S,
        metrics: &M,
    ) -> SegResult<BTreeMap<String, PathBuf>> {
        fs::create_dir_all(&self.root)?;
        let dir = self.result_dir(result_id);
        fs::create_dir(&dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => SegError::ResultExists(dir.clone()),
            _ => e.into(),
        })?;

        match write_artifacts(&dir, mask, summary, metrics) {
            Ok(paths) => {
                log::info!("结果已保存至 {}", dir.display());
                Ok(paths)
            }
            Err(e) => {
                if let Err(clean) = fs::remove_dir_all(&dir) {
                    log::warn!("无法清理不完整的结果目录 {}: {}", dir.display(), clean);
                }
                Err(e)
            }
        }
    }
}

fn write_artifacts<S: Serialize, M: Serialize>(
    dir: &Path,
    mask: &Mask,
    summary: &S,
    metrics: &M,
) -> SegResult<BTreeMap<String, PathBuf>> {
    let mask_path = dir.join(MASK_FILE);
    write_npy(&mask_path, &mask.data())?;
    let contours_path = dir.join(CONTOURS_FILE);
    write_json(&contours_path, summary)?;
    let metrics_path = dir.join(METRICS_FILE);
    write_json(&metrics_path, metrics)?;

    Ok(BTreeMap::from([
        ("mask_npy".to_string(), mask_path),
        ("contours_json".to_string(), contours_path),
        ("metrics_json".to_string(), metrics_path),
    ]))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> SegResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.flush()?;
    Ok(())
}
