use std::path::Path;

use ndarray::Ix3;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use super::{Dataset, ImageBackend};
use crate::{Metadata, SegError, SegResult};

/// NIfTI (`.nii`, `.nii.gz`) 影像后端.
///
/// 文件中的体数据按 (W, H, z) 存储, 读取后转换为 (z, H, W).
/// 重标定参数 (`scl_slope`, `scl_inter`) 由 `nifti` 库自动应用.
#[derive(Debug, Default, Clone, Copy)]
pub struct NiftiBackend;

impl ImageBackend for NiftiBackend {
    fn name(&self) -> &'static str {
        "nifti"
    }

    fn probe(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".nii") || n.ends_with(".nii.gz"))
    }

    fn read(&self, path: &Path) -> SegResult<Dataset> {
        let malformed = |reason: String| SegError::MalformedSlice {
            path: path.to_path_buf(),
            reason,
        };
        let obj = ReaderOptions::new()
            .read_file(path)
            .map_err(|e| malformed(e.to_string()))?;
        let header = obj.header().clone();

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| malformed(e.to_string()))?
            .into_dimensionality::<Ix3>()
            .map_err(|e| malformed(format!("只支持三维体数据: {e}")))?
            .permuted_axes([2, 1, 0]);
        let frames = data.as_standard_layout().into_owned();

        let (_, rows, columns) = frames.dim();
        let [_, pw, ph, pz, ..] = header.pixdim;
        let spacing = [pz as f64, ph as f64, pw as f64].map(|s| {
            if s > 0.0 {
                s
            } else {
                crate::consts::DEFAULT_SPACING[0]
            }
        });
        Ok(Dataset {
            frames,
            meta: Metadata {
                rows,
                columns,
                spacing,
                ..Metadata::default()
            },
            window: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe() {
        let b = NiftiBackend;
        assert!(b.probe(Path::new("/data/volume-0.nii")));
        assert!(b.probe(Path::new("scan.nii.gz")));
        assert!(!b.probe(Path::new("scan.dcm")));
        assert!(!b.probe(Path::new("nii")));
    }

    #[test]
    fn test_read_garbage_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.nii");
        std::fs::write(&p, b"definitely not nifti").unwrap();
        assert!(matches!(
            NiftiBackend.read(&p),
            Err(SegError::MalformedSlice { .. })
        ));
    }
}
