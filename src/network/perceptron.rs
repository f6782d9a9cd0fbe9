use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;

use super::{Model, Signal};
use crate::{
    data::{Sample, SampleKind},
    error::{OrchestraError, Result},
};

/// A dense multi-layer perceptron with `tanh` activations, trained by SGD with momentum
/// on the mean squared error.
#[derive(Debug, Clone)]
pub struct Perceptron {
    sizes: Vec<usize>,
    weights: Vec<Array2<f32>>,
    biases: Vec<Array1<f32>>,
    velocities: Vec<(Array2<f32>, Array1<f32>)>,
    learning_rate: f32,
    momentum: f32,
}

impl Perceptron {
    /// Creates a new `Perceptron`.
    ///
    /// # Arguments
    /// * `sizes` - The width of every layer, input first, at least two entries.
    /// * `learning_rate` - The SGD step size.
    /// * `momentum` - The fraction of the previous update carried into the next one.
    /// * `rng` - Source for the uniform `±1/sqrt(fan_in)` weight initialization.
    pub fn new<R: Rng>(sizes: &[usize], learning_rate: f32, momentum: f32, rng: &mut R) -> Self {
        let weights: Vec<_> = sizes
            .windows(2)
            .map(|dim| {
                let bound = 1.0 / (dim[0].max(1) as f32).sqrt();
                Array2::from_shape_fn((dim[1], dim[0]), |_| rng.random_range(-bound..bound))
            })
            .collect();

        let biases: Vec<_> = sizes[1..].iter().map(|&s| Array1::zeros(s)).collect();

        let velocities = weights
            .iter()
            .zip(&biases)
            .map(|(w, b)| (Array2::zeros(w.dim()), Array1::zeros(b.dim())))
            .collect();

        Self {
            sizes: sizes.to_vec(),
            weights,
            biases,
            velocities,
            learning_rate,
            momentum,
        }
    }

    /// Returns the activations of every layer, the input included.
    fn activations(&self, x: ArrayView1<f32>) -> Vec<Array1<f32>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.to_owned());

        for (w, b) in self.weights.iter().zip(&self.biases) {
            let prev = &activations[activations.len() - 1];
            let a = (w.dot(prev) + b).mapv_into(f32::tanh);
            activations.push(a);
        }

        activations
    }

    fn pair<'s>(&self, sample: &'s Sample) -> Result<(&'s Array1<f32>, &'s Array1<f32>)> {
        let Sample::Pair { input, expected } = sample else {
            return Err(OrchestraError::Evaluation(
                "a perceptron only trains on input/expected pairs".into(),
            ));
        };

        self.check_input(input.len())?;
        Ok((input, expected))
    }

    fn check_input(&self, got: usize) -> Result<()> {
        if got != self.input_width() {
            return Err(OrchestraError::Evaluation(format!(
                "expected {} inputs, got {got}",
                self.input_width()
            )));
        }

        Ok(())
    }
}

fn mse(y_pred: &Array1<f32>, y: &Array1<f32>) -> f32 {
    (y_pred - y).mapv(|x| x.powi(2)).mean().unwrap_or_default()
}

fn outer(v: ArrayView1<f32>, w: ArrayView1<f32>) -> Array2<f32> {
    v.insert_axis(Axis(1)).dot(&w.insert_axis(Axis(0)))
}

impl Model for Perceptron {
    fn input_width(&self) -> usize {
        self.sizes[0]
    }

    fn output_width(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    fn sample_kind(&self) -> SampleKind {
        SampleKind::Pair
    }

    fn forward(&self, input: &Signal) -> Result<Signal> {
        let Signal::Vector(x) = input else {
            return Err(OrchestraError::Evaluation(
                "a perceptron evaluates single vectors".into(),
            ));
        };
        self.check_input(x.len())?;

        let mut activations = self.activations(x.view());
        Ok(Signal::Vector(activations.pop().unwrap_or_default()))
    }

    fn learn(&mut self, sample: &Sample) -> Result<f32> {
        let (x, y) = self.pair(sample)?;
        let activations = self.activations(x.view());
        let y_pred = &activations[activations.len() - 1];
        let error = mse(y_pred, y);

        let mut delta = (y_pred - y) * y_pred.mapv(|a| 1.0 - a * a);

        for idx in (0..self.weights.len()).rev() {
            let input = &activations[idx];
            let grad_w = outer(delta.view(), input.view());

            // Propagate before this layer's weights change.
            let next_delta = (idx > 0).then(|| {
                self.weights[idx].t().dot(&delta) * input.mapv(|a| 1.0 - a * a)
            });

            let (vw, vb) = &mut self.velocities[idx];
            *vw = &*vw * self.momentum - grad_w * self.learning_rate;
            *vb = &*vb * self.momentum - &delta * self.learning_rate;
            self.weights[idx] += &*vw;
            self.biases[idx] += &*vb;

            if let Some(next) = next_delta {
                delta = next;
            }
        }

        Ok(error)
    }

    fn sample_error(&self, sample: &Sample) -> Result<f32> {
        let (x, y) = self.pair(sample)?;
        let activations = self.activations(x.view());
        Ok(mse(&activations[activations.len() - 1], y))
    }

    fn describe(&self) -> String {
        let hidden: Vec<_> = self.sizes[1..self.sizes.len() - 1]
            .iter()
            .map(usize::to_string)
            .collect();

        format!(
            "Inputs: {}, Hidden layers: [{}] neurons, Outputs: {}",
            self.input_width(),
            hidden.join(", "),
            self.output_width()
        )
    }
}
