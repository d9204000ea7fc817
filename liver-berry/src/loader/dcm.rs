use std::fs::File;
use std::io::Read;
use std::path::Path;

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use ndarray::Array3;

use super::{Dataset, ImageBackend};
use crate::consts::{DEFAULT_COLUMNS, DEFAULT_ROWS, DEFAULT_SPACING};
use crate::{CtWindow, Metadata, SegError, SegResult};

/// DICOM 文件前导区长度. 其后紧跟 `DICM` 魔数.
const PREAMBLE_LEN: usize = 128;

/// DICOM (Part 10) 影像后端.
///
/// 支持单帧与多帧文件. 像素解码后按 (帧, 行, 列) 组织, 仅支持单通道灰度数据.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomBackend;

impl ImageBackend for DicomBackend {
    fn name(&self) -> &'static str {
        "dicom"
    }

    fn probe(&self, path: &Path) -> bool {
        has_dicm_magic(path)
            || path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("dcm"))
    }

    fn read(&self, path: &Path) -> SegResult<Dataset> {
        let malformed = |reason: String| SegError::MalformedSlice {
            path: path.to_path_buf(),
            reason,
        };
        let obj = open_file(path).map_err(|e| malformed(e.to_string()))?;
        let decoded = obj
            .decode_pixel_data()
            .map_err(|e| malformed(e.to_string()))?;

        // 重标定由下面手动完成, 仅当 slope 与 intercept 同时存在时才应用.
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let array = decoded
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| malformed(e.to_string()))?;
        let shape = array.shape().to_vec();
        let values = array.into_raw_vec();

        // [帧, 行, 列, 通道]
        let &[n_frames, rows, columns, samples] = shape.as_slice() else {
            return Err(malformed(format!("意外的像素数组维度 {shape:?}")));
        };
        if samples != 1 {
            return Err(malformed(format!("仅支持单通道灰度影像, 实际通道数 {samples}")));
        }
        let mut frames = Array3::from_shape_vec((n_frames, rows, columns), values)
            .map_err(|e| malformed(e.to_string()))?;

        if let (Some(slope), Some(intercept)) = (
            first_float(&obj, tags::RESCALE_SLOPE),
            first_float(&obj, tags::RESCALE_INTERCEPT),
        ) {
            frames.mapv_inplace(|v| v * slope as f32 + intercept as f32);
        }

        let window = match (
            first_float(&obj, tags::WINDOW_CENTER),
            first_float(&obj, tags::WINDOW_WIDTH),
        ) {
            (Some(c), Some(w)) => CtWindow::new(c as f32, w as f32).ok(),
            _ => None,
        };

        Ok(Dataset {
            frames,
            meta: extract_metadata(&obj),
            window,
        })
    }
}

/// 从文件头提取元信息. 缺失字段取默认值.
fn extract_metadata(obj: &DefaultDicomObject) -> Metadata {
    let pixel_spacing = floats(obj, tags::PIXEL_SPACING);
    let spacing = [
        first_float(obj, tags::SLICE_THICKNESS).unwrap_or(DEFAULT_SPACING[0]),
        pixel_spacing.first().copied().unwrap_or(DEFAULT_SPACING[1]),
        pixel_spacing.get(1).copied().unwrap_or(DEFAULT_SPACING[2]),
    ];
    let defaults = Metadata::default();
    Metadata {
        patient_id: string(obj, tags::PATIENT_ID).unwrap_or(defaults.patient_id),
        study_date: string(obj, tags::STUDY_DATE).unwrap_or(defaults.study_date),
        modality: string(obj, tags::MODALITY).unwrap_or(defaults.modality),
        rows: int(obj, tags::ROWS).unwrap_or(DEFAULT_ROWS),
        columns: int(obj, tags::COLUMNS).unwrap_or(DEFAULT_COLUMNS),
        spacing,
        ..defaults
    }
}

/// 读取字符串元素并去除首尾空白. 空串视为缺失.
fn string(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim().trim_end_matches('\0').to_string())
        .filter(|s| !s.is_empty())
}

/// 读取多值数值元素 (以 `\` 分隔).
fn floats(obj: &DefaultDicomObject, tag: Tag) -> Vec<f64> {
    string(obj, tag)
        .map(|s| {
            s.split('\\')
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// 读取多值数值元素的第一个值.
#[inline]
fn first_float(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    floats(obj, tag).first().copied()
}

fn int(obj: &DefaultDicomObject, tag: Tag) -> Option<usize> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_int::<u32>().ok())
        .map(|v| v as usize)
}

/// 文件是否以 128 字节前导区 + `DICM` 开头?
fn has_dicm_magic(path: &Path) -> bool {
    let mut buf = [0u8; PREAMBLE_LEN + 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut buf))
        .is_ok_and(|_| &buf[PREAMBLE_LEN..] == b"DICM")
}
