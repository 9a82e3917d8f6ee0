//! Dense feed-forward networks with hand-written backpropagation.
//!
//! Inputs are batches laid out row-per-sample (`batch × features`).

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Tanh,
    Linear,
}

impl Activation {
    fn apply(self, z: &mut Array2<f64>) {
        if self == Activation::Tanh {
            z.mapv_inplace(f64::tanh);
        }
    }

    /// Derivative written in terms of the activation output.
    fn derivative_from_output(self, a: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - a * a,
            Activation::Linear => 1.0,
        }
    }
}

/// Fully connected layer: `a = act(x·W + b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

impl Dense {
    /// Xavier-uniform weights scaled by `gain`, zero bias.
    pub fn new<R: Rng + ?Sized>(
        input: usize,
        output: usize,
        activation: Activation,
        gain: f64,
        rng: &mut R,
    ) -> Self {
        let limit = gain * (6.0 / (input + output) as f64).sqrt();
        let weights = Array2::from_shape_fn((input, output), |_| rng.gen_range(-limit..=limit));
        Self {
            weights,
            bias: Array1::zeros(output),
            activation,
        }
    }

    pub fn forward(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let mut z = input.dot(&self.weights) + &self.bias;
        self.activation.apply(&mut z);
        z
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|v| v.is_finite())
    }
}

/// Gradient of the loss with respect to one layer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGrad {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl LayerGrad {
    fn squared_norm(&self) -> f64 {
        self.weights
            .iter()
            .chain(self.bias.iter())
            .map(|g| g * g)
            .sum()
    }

    fn scale(&mut self, factor: f64) {
        self.weights *= factor;
        self.bias *= factor;
    }
}

/// Layer outputs kept from a forward pass: entry 0 is the input, entry
/// `i + 1` the output of layer `i`.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    activations: Vec<Array2<f64>>,
}

/// Multi-layer perceptron: tanh hidden layers, linear output.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    /// `sizes = [input, hidden.., output]`. The output layer's init is
    /// scaled by `output_gain`.
    pub fn new<R: Rng + ?Sized>(sizes: &[usize], output_gain: f64, rng: &mut R) -> Self {
        let n = sizes.len().saturating_sub(1);
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                if i + 1 == n {
                    Dense::new(pair[0], pair[1], Activation::Linear, output_gain, &mut *rng)
                } else {
                    Dense::new(pair[0], pair[1], Activation::Tanh, 1.0, &mut *rng)
                }
            })
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Dense] {
        &mut self.layers
    }

    pub fn input_len(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.nrows())
    }

    pub fn output_len(&self) -> usize {
        self.layers.last().map_or(0, |l| l.weights.ncols())
    }

    pub fn forward(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let mut out = input.to_owned();
        for layer in &self.layers {
            out = layer.forward(out.view());
        }
        out
    }

    /// Forward pass that keeps every layer output for [`backward`](Self::backward).
    pub fn forward_cached(&self, input: ArrayView2<f64>) -> (Array2<f64>, ForwardCache) {
        let mut activations = vec![input.to_owned()];
        for layer in &self.layers {
            let next = layer.forward(activations[activations.len() - 1].view());
            activations.push(next);
        }
        let output = activations[activations.len() - 1].clone();
        (output, ForwardCache { activations })
    }

    /// Parameter gradients given `dL/d(output)`, one entry per layer in order.
    pub fn backward(&self, cache: &ForwardCache, grad_output: Array2<f64>) -> Vec<LayerGrad> {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut delta = grad_output;

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let output = &cache.activations[i + 1];
            let input = &cache.activations[i];

            let activation = layer.activation;
            delta.zip_mut_with(output, |d, &a| *d *= activation.derivative_from_output(a));

            let weights = input.t().dot(&delta);
            let bias = delta.sum_axis(Axis(0));
            if i > 0 {
                delta = delta.dot(&layer.weights.t());
            }
            grads.push(LayerGrad { weights, bias });
        }

        grads.reverse();
        grads
    }

    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(Dense::is_finite)
    }
}

/// Scale gradients so their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut [LayerGrad], max_norm: f64) -> f64 {
    let total = grads.iter().map(LayerGrad::squared_norm).sum::<f64>().sqrt();
    let coef = max_norm / (total + 1e-6);
    if coef < 1.0 {
        for g in grads.iter_mut() {
            g.scale(coef);
        }
    }
    total
}

/// Row-wise log-softmax, stable against large logits.
pub fn log_softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let log_sum = row.iter().map(|&z| (z - max).exp()).sum::<f64>().ln() + max;
        row.mapv_inplace(|z| z - log_sum);
    }
    out
}
