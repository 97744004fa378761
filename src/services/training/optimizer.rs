/// AdamW optimizer with lazy (row-sparse) updates.
///
/// Each mini-batch touches only a handful of embedding rows, so moment
/// estimates and decoupled weight decay are applied per touched row rather
/// than across whole tables. Bias correction uses the global step counter.
use ndarray::{Array1, Array2};
use std::collections::HashMap;

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

pub struct AdamW {
    lr: f32,
    weight_decay: f32,
    step: i32,
}

/// First/second moment estimates for a 2-D parameter table.
pub struct Moments2 {
    m: Array2<f32>,
    v: Array2<f32>,
}

/// First/second moment estimates for a 1-D parameter vector.
pub struct Moments1 {
    m: Array1<f32>,
    v: Array1<f32>,
}

/// Moment estimates for a scalar parameter.
#[derive(Default)]
pub struct MomentsScalar {
    m: f32,
    v: f32,
}

impl Moments2 {
    pub fn zeros_like(param: &Array2<f32>) -> Self {
        Self {
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        }
    }
}

impl Moments1 {
    pub fn zeros_like(param: &Array1<f32>) -> Self {
        Self {
            m: Array1::zeros(param.raw_dim()),
            v: Array1::zeros(param.raw_dim()),
        }
    }
}

impl AdamW {
    pub fn new(lr: f32, weight_decay: f32) -> Self {
        Self {
            lr,
            weight_decay,
            step: 0,
        }
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    /// Advance the global step counter. Call once per optimizer step, before
    /// any `update_*` call for that step.
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    fn bias_corrections(&self) -> (f32, f32) {
        (
            1.0 - BETA1.powi(self.step),
            1.0 - BETA2.powi(self.step),
        )
    }

    /// Apply one AdamW step to the rows of `param` named in `grads`.
    pub fn update_rows(
        &self,
        param: &mut Array2<f32>,
        moments: &mut Moments2,
        grads: &HashMap<usize, Array1<f32>>,
    ) {
        let (bc1, bc2) = self.bias_corrections();
        for (&row, grad) in grads {
            for (col, &g) in grad.iter().enumerate() {
                let m = &mut moments.m[[row, col]];
                let v = &mut moments.v[[row, col]];
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                let p = &mut param[[row, col]];
                *p -= self.lr * (m_hat / (v_hat.sqrt() + EPS) + self.weight_decay * *p);
            }
        }
    }

    /// Apply one AdamW step to the entries of `param` named in `grads`.
    pub fn update_entries(
        &self,
        param: &mut Array1<f32>,
        moments: &mut Moments1,
        grads: &HashMap<usize, f32>,
    ) {
        let (bc1, bc2) = self.bias_corrections();
        for (&idx, &g) in grads {
            let m = &mut moments.m[idx];
            let v = &mut moments.v[idx];
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            let p = &mut param[idx];
            *p -= self.lr * (m_hat / (v_hat.sqrt() + EPS) + self.weight_decay * *p);
        }
    }

    pub fn update_scalar(&self, param: &mut f32, moments: &mut MomentsScalar, grad: f32) {
        let (bc1, bc2) = self.bias_corrections();
        moments.m = BETA1 * moments.m + (1.0 - BETA1) * grad;
        moments.v = BETA2 * moments.v + (1.0 - BETA2) * grad * grad;
        let m_hat = moments.m / bc1;
        let v_hat = moments.v / bc2;
        *param -= self.lr * (m_hat / (v_hat.sqrt() + EPS) + self.weight_decay * *param);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_moves_against_gradient() {
        let mut param = Array2::from_elem((2, 2), 1.0_f32);
        let mut moments = Moments2::zeros_like(&param);
        let mut opt = AdamW::new(0.1, 0.0);

        let mut grads = HashMap::new();
        grads.insert(0usize, Array1::from(vec![1.0_f32, -1.0]));

        opt.begin_step();
        opt.update_rows(&mut param, &mut moments, &grads);

        // Positive gradient decreases the parameter, negative increases it.
        assert!(param[[0, 0]] < 1.0);
        assert!(param[[0, 1]] > 1.0);
        // Untouched row stays put.
        assert_eq!(param[[1, 0]], 1.0);
        assert_eq!(param[[1, 1]], 1.0);
    }

    #[test]
    fn test_weight_decay_shrinks_touched_rows() {
        let mut param = Array1::from(vec![2.0_f32, 2.0]);
        let mut moments = Moments1::zeros_like(&param);
        let mut opt = AdamW::new(0.1, 0.5);

        let mut grads = HashMap::new();
        grads.insert(0usize, 0.0_f32);

        opt.begin_step();
        opt.update_entries(&mut param, &mut moments, &grads);

        // Zero gradient: only decoupled decay applies.
        assert!((param[0] - (2.0 - 0.1 * 0.5 * 2.0)).abs() < 1e-6);
        assert_eq!(param[1], 2.0);
    }

    #[test]
    fn test_scalar_update() {
        let mut param = 0.0_f32;
        let mut moments = MomentsScalar::default();
        let mut opt = AdamW::new(0.05, 0.0);

        opt.begin_step();
        opt.update_scalar(&mut param, &mut moments, 1.0);

        assert!(param < 0.0);
    }
}
