//! Adam optimiser over a sequence of dense layers.

use ndarray::{Array1, Array2, Zip};

use super::network::{Dense, LayerGrad};

#[derive(Debug, Clone)]
struct Moments {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl Moments {
    fn zeros_like(grad: &LayerGrad) -> Self {
        Self {
            m_w: Array2::zeros(grad.weights.raw_dim()),
            v_w: Array2::zeros(grad.weights.raw_dim()),
            m_b: Array1::zeros(grad.bias.raw_dim()),
            v_b: Array1::zeros(grad.bias.raw_dim()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-5,
            t: 0,
            moments: Vec::new(),
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Number of steps taken.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// One descent step. `layers` and `grads` must line up one to one and
    /// keep the same order across calls.
    pub fn step<'a>(&mut self, layers: impl IntoIterator<Item = &'a mut Dense>, grads: &[LayerGrad]) {
        if self.moments.len() != grads.len() {
            self.moments = grads.iter().map(Moments::zeros_like).collect();
        }
        self.t += 1;
        let correction1 = 1.0 - self.beta1.powi(self.t);
        let correction2 = 1.0 - self.beta2.powi(self.t);
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);

        let update = move |p: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for ((layer, grad), moments) in layers.into_iter().zip(grads).zip(&mut self.moments) {
            Zip::from(&mut layer.weights)
                .and(&mut moments.m_w)
                .and(&mut moments.v_w)
                .and(&grad.weights)
                .for_each(|p, m, v, &g| update(p, m, v, g));
            Zip::from(&mut layer.bias)
                .and(&mut moments.m_b)
                .and(&mut moments.v_b)
                .and(&grad.bias)
                .for_each(|p, m, v, &g| update(p, m, v, g));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::network::Activation;
    use ndarray::array;

    fn layer(w: f64) -> Dense {
        Dense {
            weights: array![[w]],
            bias: array![0.0],
            activation: Activation::Linear,
        }
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        // Bias-corrected first step is lr * g / (|g| + eps) ≈ lr * sign(g).
        let mut adam = Adam::new(0.1).with_epsilon(1e-12);
        let mut l = layer(1.0);
        let grad = LayerGrad {
            weights: array![[4.0]],
            bias: array![-2.0],
        };
        adam.step([&mut l], &[grad]);
        assert!((l.weights[[0, 0]] - 0.9).abs() < 1e-9);
        assert!((l.bias[0] - 0.1).abs() < 1e-9);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn minimises_quadratic() {
        // L = (w - 3)^2
        let mut adam = Adam::new(0.05);
        let mut l = layer(0.0);
        for _ in 0..2000 {
            let w = l.weights[[0, 0]];
            let grad = LayerGrad {
                weights: array![[2.0 * (w - 3.0)]],
                bias: array![0.0],
            };
            adam.step([&mut l], &[grad]);
        }
        assert!((l.weights[[0, 0]] - 3.0).abs() < 1e-2);
    }
}
