// 📊 Metrics - ROC-AUC and a per-class classification report

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label 1 when `p >= threshold`
pub fn predict_labels(proba: &[f64], threshold: f64) -> Vec<i32> {
    proba.iter().map(|&p| i32::from(p >= threshold)).collect()
}

/// Area under the ROC curve via the rank statistic (tied scores share
/// their average rank). Needs both classes.
pub fn roc_auc(labels: &[i32], scores: &[f64]) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(PipelineError::Model(format!(
            "{} labels for {} scores",
            labels.len(),
            scores.len()
        )));
    }

    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(PipelineError::InvalidTarget(
            "ROC-AUC needs both classes".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1 ..= j+1
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &row in &order[i..=j] {
            if labels[row] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos_f = n_pos as f64;
    Ok((rank_sum_pos - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg as f64))
}

// ============================================================================
// CLASSIFICATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Indexed by label: 0 then 1
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationReport {
    /// Ill-defined precision / recall (zero denominator) are reported as 0
    pub fn new(labels: &[i32], predicted: &[i32]) -> Result<Self> {
        if labels.len() != predicted.len() {
            return Err(PipelineError::Model(format!(
                "{} labels for {} predictions",
                labels.len(),
                predicted.len()
            )));
        }

        let class = |c: i32| {
            let tp = labels.iter().zip(predicted).filter(|&(&l, &p)| l == c && p == c).count();
            let predicted_c = predicted.iter().filter(|&&p| p == c).count();
            let support = labels.iter().filter(|&&l| l == c).count();
            let precision = ratio(tp, predicted_c);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        };
        let classes = [class(0), class(1)];

        let correct = labels.iter().zip(predicted).filter(|(l, p)| l == p).count();
        let total: usize = classes.iter().map(|c| c.support).sum();

        let average = |weight: &dyn Fn(&ClassMetrics) -> f64| {
            let norm: f64 = classes.iter().map(weight).sum();
            let avg = |metric: fn(&ClassMetrics) -> f64| {
                if norm == 0.0 {
                    0.0
                } else {
                    classes.iter().map(|c| metric(c) * weight(c)).sum::<f64>() / norm
                }
            };
            ClassMetrics {
                precision: avg(|c| c.precision),
                recall: avg(|c| c.recall),
                f1: avg(|c| c.f1),
                support: total,
            }
        };

        Ok(ClassificationReport {
            macro_avg: average(&|_| 1.0),
            weighted_avg: average(&|c| c.support as f64),
            accuracy: ratio(correct, labels.len()),
            classes,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14}{:>10}{:>10}{:>10}{:>10}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (label, c) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>14}{:>10.4}{:>10.4}{:>10.4}{:>10}",
                label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14}{:>10}{:>10}{:>10.4}{:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, c) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14}{:>10.4}{:>10.4}{:>10.4}{:>10}",
                name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        Ok(())
    }
}
