use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use super::{Model, Signal};
use crate::{
    data::{Sample, SampleKind},
    error::{OrchestraError, Result},
};

const EPSILON: f32 = 1e-7;

/// An Elman recurrent network: a `tanh` hidden state fed back into itself and a
/// softmax output per step, trained with truncated backpropagation through time
/// on the cross-entropy loss.
#[derive(Debug, Clone)]
pub struct Elman {
    /// Input to hidden weights.
    u: Array2<f32>,
    /// Hidden to hidden weights.
    w: Array2<f32>,
    /// Hidden to output weights.
    v: Array2<f32>,
    learning_rate: f32,
    bptt_truncate: usize,
}

/// Everything a forward pass leaves behind for the backward pass.
struct Trace {
    states: Vec<Array1<f32>>,
    outputs: Array2<f32>,
}

impl Elman {
    /// Creates a new `Elman` network.
    ///
    /// # Arguments
    /// * `inputs` - The width of every input step.
    /// * `cells` - The amount of hidden recurrent cells.
    /// * `outputs` - The width of every output step.
    /// * `learning_rate` - The SGD step size.
    /// * `bptt_truncate` - How many steps back each error is propagated.
    /// * `rng` - Source for the weight initialization.
    pub fn new<R: Rng>(
        inputs: usize,
        cells: usize,
        outputs: usize,
        learning_rate: f32,
        bptt_truncate: usize,
        rng: &mut R,
    ) -> Self {
        let mut uniform = |rows: usize, cols: usize| {
            let bound = 1.0 / (cols.max(1) as f32).sqrt();
            Array2::from_shape_fn((rows, cols), |_| rng.random_range(-bound..bound))
        };

        Self {
            u: uniform(cells, inputs),
            w: uniform(cells, cells),
            v: uniform(outputs, cells),
            learning_rate,
            bptt_truncate,
        }
    }

    /// The amount of hidden recurrent cells.
    pub fn cells(&self) -> usize {
        self.w.nrows()
    }

    fn run(&self, xs: ArrayView2<f32>) -> Result<Trace> {
        if xs.ncols() != self.input_width() {
            return Err(OrchestraError::Evaluation(format!(
                "expected steps of width {}, got {}",
                self.input_width(),
                xs.ncols()
            )));
        }

        let mut states = Vec::with_capacity(xs.nrows());
        let mut outputs = Array2::<f32>::zeros((xs.nrows(), self.output_width()));
        let mut s = Array1::<f32>::zeros(self.cells());

        for (x, mut o) in xs.rows().into_iter().zip(outputs.rows_mut()) {
            s = (self.u.dot(&x) + self.w.dot(&s)).mapv_into(f32::tanh);
            o.assign(&softmax(self.v.dot(&s).view()));
            states.push(s.clone());
        }

        Ok(Trace { states, outputs })
    }

    fn split(sample: &Sample) -> Result<(Array2<f32>, Array2<f32>)> {
        let Sample::Sequence(steps) = sample else {
            return Err(OrchestraError::Evaluation(
                "an Elman network only trains on sequences".into(),
            ));
        };
        if steps.len() < 2 {
            return Err(OrchestraError::EmptySamples);
        }

        let views: Vec<_> = steps.iter().map(|s| s.view()).collect();
        let all = ndarray::stack(Axis(0), &views)?;
        let n = all.nrows();
        let xs = all.slice(ndarray::s![..n - 1, ..]).to_owned();
        let ys = all.slice(ndarray::s![1.., ..]).to_owned();
        Ok((xs, ys))
    }
}

fn softmax(z: ArrayView1<f32>) -> Array1<f32> {
    let max = z.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    let exp = z.mapv(|x| (x - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn cross_entropy(outputs: &Array2<f32>, ys: &Array2<f32>) -> f32 {
    let total: f32 = outputs
        .iter()
        .zip(ys)
        .map(|(&o, &y)| -y * (o + EPSILON).ln())
        .sum();
    total / outputs.nrows().max(1) as f32
}

fn outer(v: ArrayView1<f32>, w: ArrayView1<f32>) -> Array2<f32> {
    v.insert_axis(Axis(1)).dot(&w.insert_axis(Axis(0)))
}

impl Model for Elman {
    fn input_width(&self) -> usize {
        self.u.ncols()
    }

    fn output_width(&self) -> usize {
        self.v.nrows()
    }

    fn sample_kind(&self) -> SampleKind {
        SampleKind::Sequence
    }

    fn forward(&self, input: &Signal) -> Result<Signal> {
        let Signal::Sequence(xs) = input else {
            return Err(OrchestraError::Evaluation(
                "an Elman network evaluates sequences".into(),
            ));
        };
        if xs.nrows() == 0 {
            return Err(OrchestraError::Evaluation("empty input sequence".into()));
        }

        Ok(Signal::Sequence(self.run(xs.view())?.outputs))
    }

    fn learn(&mut self, sample: &Sample) -> Result<f32> {
        let (xs, ys) = Self::split(sample)?;
        let Trace { states, outputs } = self.run(xs.view())?;
        let error = cross_entropy(&outputs, &ys);

        let mut du = Array2::<f32>::zeros(self.u.dim());
        let mut dw = Array2::<f32>::zeros(self.w.dim());
        let mut dv = Array2::<f32>::zeros(self.v.dim());
        let zeros = Array1::<f32>::zeros(self.cells());

        for t in (0..xs.nrows()).rev() {
            let delta_o = &outputs.row(t) - &ys.row(t);
            dv += &outer(delta_o.view(), states[t].view());

            let mut delta = self.v.t().dot(&delta_o) * states[t].mapv(|s| 1.0 - s * s);
            let first = t.saturating_sub(self.bptt_truncate);

            for step in (first..=t).rev() {
                let prev = if step > 0 { &states[step - 1] } else { &zeros };
                dw += &outer(delta.view(), prev.view());
                du += &outer(delta.view(), xs.row(step));
                delta = self.w.t().dot(&delta) * prev.mapv(|s| 1.0 - s * s);
            }
        }

        self.u.scaled_add(-self.learning_rate, &du);
        self.w.scaled_add(-self.learning_rate, &dw);
        self.v.scaled_add(-self.learning_rate, &dv);

        Ok(error)
    }

    fn sample_error(&self, sample: &Sample) -> Result<f32> {
        let (xs, ys) = Self::split(sample)?;
        let trace = self.run(xs.view())?;
        Ok(cross_entropy(&trace.outputs, &ys))
    }

    fn describe(&self) -> String {
        format!(
            "Inputs: {}, Recurrent layers: {}",
            self.input_width(),
            self.cells()
        )
    }

    /// Scales the per-step cross-entropy by that of a uniform guess, so an
    /// untrained network reports roughly `1.0`.
    fn normalize_error(&self, raw: f32) -> f32 {
        let uniform = (self.output_width().max(2) as f32).ln();
        raw / uniform
    }
}
