// 📈 Baseline - L2-regularized logistic regression over a dense design matrix
//
// Objective (per-sample weights w_i):
//   sum_i w_i * logloss_i / n  +  ||beta||^2 / (2 * C * n)
// minimized with full-batch gradient descent; the intercept is not penalized.

use crate::config::BaselineParams;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const BALANCED: &str = "balanced";

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// `n / (n_classes * n_c)` per label, 1.0 everywhere when `balanced` is off
pub fn class_weights(labels: &[i32], balanced: bool) -> Array1<f64> {
    if !balanced {
        return Array1::ones(labels.len());
    }

    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for &l in labels {
        *counts.entry(l).or_insert(0) += 1;
    }
    let n = labels.len() as f64;
    let k = counts.len() as f64;

    labels
        .iter()
        .map(|l| n / (k * counts[l] as f64))
        .collect()
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub n_iter: usize,
    pub converged: bool,
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, labels: &[i32], params: &BaselineParams) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(PipelineError::EmptyTable("baseline training matrix".to_string()));
        }
        if labels.len() != n {
            return Err(PipelineError::Model(format!(
                "{} labels for {} rows",
                labels.len(),
                n
            )));
        }
        if params.c <= 0.0 {
            return Err(PipelineError::Model(format!("C must be positive, got {}", params.c)));
        }

        let y: Array1<f64> = labels.iter().map(|&l| f64::from(l)).collect();
        let weights = class_weights(labels, params.balanced);
        let n_f = n as f64;
        let l2 = 1.0 / (params.c * n_f);

        let mut beta = Array1::<f64>::zeros(p);
        let mut bias = 0.0;
        let mut converged = false;
        let mut n_iter = 0;

        for iter in 0..params.max_iter {
            n_iter = iter + 1;

            let z = x.dot(&beta) + bias;
            let p_hat = z.mapv(sigmoid);
            let residual = (&p_hat - &y) * &weights;

            let grad_beta = x.t().dot(&residual) / n_f + &beta * l2;
            let grad_bias = residual.sum() / n_f;

            beta.scaled_add(-params.learning_rate, &grad_beta);
            bias -= params.learning_rate * grad_bias;

            let max_grad = grad_beta
                .iter()
                .fold(grad_bias.abs(), |acc, g| acc.max(g.abs()));
            if max_grad < params.tolerance {
                converged = true;
                break;
            }
        }

        if converged {
            debug!(n_iter, "logistic regression converged");
        } else {
            info!(max_iter = params.max_iter, "logistic regression stopped at max_iter");
        }

        Ok(LogisticRegression {
            coefficients: beta,
            intercept: bias,
            n_iter,
            converged,
        })
    }

    /// P(TARGET = 1) per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.len_of(Axis(1)) != self.coefficients.len() {
            return Err(PipelineError::Model(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                x.len_of(Axis(1))
            )));
        }
        Ok((x.dot(&self.coefficients) + self.intercept).mapv(sigmoid))
    }
}
