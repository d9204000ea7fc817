use std::fmt;

use super::Metrics;

const RULE: &str = "============================================================";

/// 多段落的人类可读报告. 缺失的部分显示为 `N/A`.
impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "肝脏分割指标报告")?;
        writeln!(f, "{RULE}")?;

        match &self.overlap {
            Some(o) => {
                writeln!(f, "\n重叠指标:")?;
                writeln!(f, "  Dice 系数:          {:.6}", o.dice)?;
                writeln!(f, "  IoU (Jaccard):      {:.6}", o.iou)?;
                writeln!(f, "\n分类指标:")?;
                writeln!(f, "  敏感度 (召回率):    {:.6}", o.sensitivity)?;
                writeln!(f, "  特异度:             {:.6}", o.specificity)?;
                writeln!(f, "  像素准确率:         {:.6}", o.pixel_accuracy)?;
            }
            None => writeln!(f, "\n重叠/分类指标:      N/A (无真值)")?,
        }
        if let Some(d) = self.hausdorff95_mm {
            writeln!(f, "  Hausdorff95 (mm):   {d:.3}")?;
        }

        writeln!(f, "\n体积指标:")?;
        writeln!(f, "  体积 (mL):          {:.2}", self.volume.volume_ml)?;
        writeln!(f, "  体积 (mm³):         {:.2}", self.volume.volume_mm3)?;
        writeln!(f, "  体素数:             {}", self.volume.voxel_count)?;

        writeln!(f, "\n临床评估:")?;
        match &self.clinical {
            Some(c) => {
                writeln!(f, "  质量等级:           {}", c.quality_grade)?;
                writeln!(f, "  达到临床标准:       {}", c.meets_clinical_standards)?;
            }
            None => {
                writeln!(f, "  质量等级:           N/A")?;
                writeln!(f, "  达到临床标准:       false")?;
            }
        }
        write!(f, "{RULE}")
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::{calculate_all_metrics, volume_from_count, Metrics};
    use ndarray::Array3;

    #[test]
    fn test_report_sections() {
        let gt = Array3::<u8>::ones((2, 2, 2));
        let text = calculate_all_metrics(&gt, &gt, [1.0; 3]).to_string();
        assert!(text.contains("Dice 系数:          1.000000"));
        assert!(text.contains("体素数:             8"));
        assert!(text.contains("Excellent"));
        assert!(text.contains("达到临床标准:       true"));
    }

    #[test]
    fn test_report_without_ground_truth() {
        let text = Metrics::volume_only(volume_from_count(2000, [1.0; 3])).to_string();
        assert!(text.contains("N/A (无真值)"));
        assert!(text.contains("体积 (mL):          2.00"));
        assert!(!text.contains("Hausdorff"));
    }
}
