//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, SegError, SegResult, Spacing};

pub use crate::data::{CtWindow, Mask, MaskSlice, MaskSliceMut, Metadata, Volume};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_LIVER};
pub use crate::consts::ElemType;

pub use crate::config::PipelineConfig;
pub use crate::loader::{ImageBackend, SyntheticVolume, VolumeLoader};
pub use crate::metrics::{ClinicalCriteria, Metrics, MetricsEngine, QualityGrade};
pub use crate::pipeline::{LiverSegmentation, PipelineObserver, Segmentation};
pub use crate::post_proc::{MaskRefiner, Postprocessor};
pub use crate::predict::{create_predictor, Device, FnPredictor, Predictor};
pub use crate::store::ResultStore;
pub use crate::summary::{summarize, SliceSummary};
