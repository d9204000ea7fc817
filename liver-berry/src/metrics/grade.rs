use std::fmt;

use serde::{Deserialize, Serialize};

/// 分割质量等级.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    /// 差.
    Poor,
    /// 一般.
    Fair,
    /// 良好.
    Good,
    /// 优秀.
    Excellent,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Poor => "Poor",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        };
        f.write_str(s)
    }
}

/// 临床评估结果.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalAssessment {
    /// Dice 与 IoU 是否同时达到临床标准.
    pub meets_clinical_standards: bool,

    /// 按 Dice 划分的质量等级.
    pub quality_grade: QualityGrade,
}

/// 临床分级标准. 所有比较均为 `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalCriteria {
    /// 达到 `Excellent` 的最低 Dice.
    pub excellent: f64,
    /// 达到 `Good` 的最低 Dice.
    pub good: f64,
    /// 达到 `Fair` 的最低 Dice.
    pub fair: f64,
    /// 满足临床标准的最低 Dice.
    pub min_dice: f64,
    /// 满足临床标准的最低 IoU.
    pub min_iou: f64,
}

impl Default for ClinicalCriteria {
    fn default() -> Self {
        Self {
            excellent: 0.90,
            good: 0.80,
            fair: 0.70,
            min_dice: 0.90,
            min_iou: 0.90,
        }
    }
}

impl ClinicalCriteria {
    /// 由 Dice 得到质量等级.
    pub fn grade(&self, dice: f64) -> QualityGrade {
        if dice >= self.excellent {
            QualityGrade::Excellent
        } else if dice >= self.good {
            QualityGrade::Good
        } else if dice >= self.fair {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }

    /// Dice 与 IoU 是否同时达标.
    #[inline]
    pub fn meets(&self, dice: f64, iou: f64) -> bool {
        dice >= self.min_dice && iou >= self.min_iou
    }

    /// 完整的临床评估.
    #[inline]
    pub fn assess(&self, dice: f64, iou: f64) -> ClinicalAssessment {
        ClinicalAssessment {
            meets_clinical_standards: self.meets(dice, iou),
            quality_grade: self.grade(dice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_boundaries() {
        let c = ClinicalCriteria::default();
        assert_eq!(c.grade(1.0), QualityGrade::Excellent);
        assert_eq!(c.grade(0.90), QualityGrade::Excellent);
        assert_eq!(c.grade(0.8999), QualityGrade::Good);
        assert_eq!(c.grade(0.80), QualityGrade::Good);
        assert_eq!(c.grade(0.7999), QualityGrade::Fair);
        assert_eq!(c.grade(0.70), QualityGrade::Fair);
        assert_eq!(c.grade(0.6999), QualityGrade::Poor);
        assert_eq!(c.grade(0.0), QualityGrade::Poor);
    }

    #[test]
    fn test_meets_needs_both() {
        let c = ClinicalCriteria::default();
        assert!(!c.meets(0.95, 0.85));
        assert!(!c.meets(0.85, 0.95));
        assert!(c.meets(0.90, 0.90));
        let a = c.assess(0.95, 0.85);
        assert_eq!(a.quality_grade, QualityGrade::Excellent);
        assert!(!a.meets_clinical_standards);
    }

    #[test]
    fn test_grade_serde() {
        assert_eq!(
            serde_json::to_string(&QualityGrade::Good).unwrap(),
            "\"Good\""
        );
        assert_eq!(QualityGrade::Fair.to_string(), "Fair");
        assert!(QualityGrade::Excellent > QualityGrade::Poor);
        let c: ClinicalCriteria = toml::from_str("excellent = 0.95").unwrap();
        assert_eq!(c.excellent, 0.95);
        assert_eq!(c.good, 0.80);
    }
}
