use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::Rng;

use crate::features::FEATURE_LEN;

pub const HIDDEN_UNITS: usize = 16;
pub const TRAINING_EPOCHS: usize = 50;
pub const LEARNING_RATE: f64 = 0.01;

/// Fully connected layer. Weights are stored flat, row-major by output unit:
/// `weights[out * inputs + in]`.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl DenseLayer {
    /// Glorot-uniform weight init, zero biases.
    pub fn new<R: Rng + ?Sized>(rng: &mut R, inputs: usize, outputs: usize) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights = (0..inputs * outputs)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();

        Self {
            inputs,
            outputs,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    /// Pre-activation outputs.
    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                self.biases[o]
                    + row
                        .iter()
                        .zip(input)
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
            })
            .collect()
    }

    fn write_weights<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for &w in &self.weights {
            writer.write_f32::<LittleEndian>(w as f32)?;
        }
        for &b in &self.biases {
            writer.write_f32::<LittleEndian>(b as f32)?;
        }

        Ok(())
    }

    fn read_weights<R: Read>(reader: &mut R, inputs: usize, outputs: usize) -> io::Result<Self> {
        let mut weights = vec![0.0; inputs * outputs];
        for w in &mut weights {
            *w = reader.read_f32::<LittleEndian>()? as f64;
        }

        let mut biases = vec![0.0; outputs];
        for b in &mut biases {
            *b = reader.read_f32::<LittleEndian>()? as f64;
        }

        Ok(Self {
            inputs,
            outputs,
            weights,
            biases,
        })
    }
}

/// The fixed classifier architecture: 12 inputs, 16 rectified hidden units,
/// N softmax outputs where N is the class count at training time.
#[derive(Debug, Clone)]
pub struct Network {
    pub hidden: DenseLayer,
    pub output: DenseLayer,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, class_count: usize) -> Self {
        Self {
            hidden: DenseLayer::new(rng, FEATURE_LEN, HIDDEN_UNITS),
            output: DenseLayer::new(rng, HIDDEN_UNITS, class_count),
        }
    }

    /// Output width the model was trained for.
    pub fn class_count(&self) -> usize {
        self.output.outputs
    }

    /// Forward pass producing one probability per class.
    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        let hidden = relu(self.hidden.forward(features));
        softmax(self.output.forward(&hidden))
    }

    /// Raw parameter bytes: hidden kernel, hidden bias, output kernel,
    /// output bias, each as little-endian f32 in layer storage order.
    pub fn write_weights<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.hidden.write_weights(writer)?;
        self.output.write_weights(writer)?;

        Ok(())
    }

    pub fn read_weights<R: Read>(reader: &mut R, class_count: usize) -> io::Result<Self> {
        let hidden = DenseLayer::read_weights(reader, FEATURE_LEN, HIDDEN_UNITS)?;
        let output = DenseLayer::read_weights(reader, HIDDEN_UNITS, class_count)?;

        Ok(Self { hidden, output })
    }
}

fn relu(mut values: Vec<f64>) -> Vec<f64> {
    for v in &mut values {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
    values
}

fn softmax(logits: Vec<f64>) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the highest probability; ties break to the first index
/// encountered.
pub fn argmax(probabilities: &[f64]) -> usize {
    let mut best = 0;
    for (i, &p) in probabilities.iter().enumerate().skip(1) {
        if p > probabilities[best] {
            best = i;
        }
    }
    best
}

/// One completed epoch in the training log.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochLog {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Adam state for one parameter tensor.
struct Adam {
    step: u64,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPSILON: f64 = 1e-7;

    fn new(len: usize) -> Self {
        Self {
            step: 0,
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    fn update(&mut self, params: &mut [f64], grads: &[f64]) {
        self.step += 1;
        let bias1 = 1.0 - Self::BETA1.powi(self.step as i32);
        let bias2 = 1.0 - Self::BETA2.powi(self.step as i32);

        for i in 0..params.len() {
            self.m[i] = Self::BETA1 * self.m[i] + (1.0 - Self::BETA1) * grads[i];
            self.v[i] = Self::BETA2 * self.v[i] + (1.0 - Self::BETA2) * grads[i] * grads[i];

            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;

            params[i] -= LEARNING_RATE * m_hat / (v_hat.sqrt() + Self::EPSILON);
        }
    }
}

/// Supervised training: full-batch gradient descent with Adam, minimizing
/// categorical cross-entropy over one-hot labels, for the fixed epoch count.
/// Returns the trained network together with one log entry per epoch.
pub fn train<R: Rng + ?Sized>(
    rng: &mut R,
    inputs: &[Vec<f64>],
    labels: &[usize],
    class_count: usize,
) -> (Network, Vec<EpochLog>) {
    let mut network = Network::new(rng, class_count);
    let samples = inputs.len();

    let mut adam_hw = Adam::new(network.hidden.weights.len());
    let mut adam_hb = Adam::new(network.hidden.biases.len());
    let mut adam_ow = Adam::new(network.output.weights.len());
    let mut adam_ob = Adam::new(network.output.biases.len());

    let mut log = Vec::with_capacity(TRAINING_EPOCHS);

    for epoch in 0..TRAINING_EPOCHS {
        let mut grad_hw = vec![0.0; network.hidden.weights.len()];
        let mut grad_hb = vec![0.0; network.hidden.biases.len()];
        let mut grad_ow = vec![0.0; network.output.weights.len()];
        let mut grad_ob = vec![0.0; network.output.biases.len()];

        let mut loss = 0.0;
        let mut correct = 0usize;
        let scale = 1.0 / samples as f64;

        for (features, &label) in inputs.iter().zip(labels) {
            let hidden_pre = network.hidden.forward(features);
            let hidden = relu(hidden_pre.clone());
            let probabilities = softmax(network.output.forward(&hidden));

            loss -= probabilities[label].max(f64::MIN_POSITIVE).ln() * scale;
            if argmax(&probabilities) == label {
                correct += 1;
            }

            // Softmax + cross-entropy gradient: p - onehot.
            let mut d_logits = probabilities;
            d_logits[label] -= 1.0;

            for o in 0..network.output.outputs {
                let d = d_logits[o] * scale;
                grad_ob[o] += d;
                for h in 0..HIDDEN_UNITS {
                    grad_ow[o * HIDDEN_UNITS + h] += d * hidden[h];
                }
            }

            for h in 0..HIDDEN_UNITS {
                if hidden_pre[h] <= 0.0 {
                    continue;
                }

                let d_hidden: f64 = (0..network.output.outputs)
                    .map(|o| network.output.weights[o * HIDDEN_UNITS + h] * d_logits[o] * scale)
                    .sum();

                grad_hb[h] += d_hidden;
                for i in 0..FEATURE_LEN {
                    grad_hw[h * FEATURE_LEN + i] += d_hidden * features[i];
                }
            }
        }

        adam_hw.update(&mut network.hidden.weights, &grad_hw);
        adam_hb.update(&mut network.hidden.biases, &grad_hb);
        adam_ow.update(&mut network.output.weights, &grad_ow);
        adam_ob.update(&mut network.output.biases, &grad_ob);

        log.push(EpochLog {
            epoch,
            loss,
            accuracy: correct as f64 / samples as f64,
        });
    }

    (network, log)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn one_hot_sample(index: usize, value: f64) -> Vec<f64> {
        let mut sample = vec![0.0; FEATURE_LEN];
        sample[index] = value;
        sample
    }

    #[test]
    fn test_predict_is_a_probability_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let network = Network::new(&mut rng, 3);

        let probabilities = network.predict(&one_hot_sample(0, 1.0));
        assert_eq!(probabilities.len(), 3);

        let sum: f64 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probabilities.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_argmax_breaks_ties_to_first_index() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.1, 0.5, 0.4]), 1);
    }

    #[test]
    fn test_training_separates_two_distinct_clusters() {
        let mut rng = StdRng::seed_from_u64(42);

        let inputs: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    one_hot_sample(0, 1.0)
                } else {
                    one_hot_sample(6, 1.0)
                }
            })
            .collect();
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();

        let (network, log) = train(&mut rng, &inputs, &labels, 2);

        assert_eq!(log.len(), TRAINING_EPOCHS);
        assert_eq!(log[0].epoch, 0);
        assert!(log.last().unwrap().loss < log[0].loss);
        assert_eq!(log.last().unwrap().accuracy, 1.0);

        assert_eq!(argmax(&network.predict(&one_hot_sample(0, 1.0))), 0);
        assert_eq!(argmax(&network.predict(&one_hot_sample(6, 1.0))), 1);
    }

    #[test]
    fn test_weight_serialization_roundtrip() {
        let mut rng = StdRng::seed_from_u64(3);
        let network = Network::new(&mut rng, 4);

        let mut bytes = Vec::new();
        network.write_weights(&mut bytes).unwrap();

        let expected = (FEATURE_LEN * HIDDEN_UNITS + HIDDEN_UNITS)
            + (HIDDEN_UNITS * 4 + 4);
        assert_eq!(bytes.len(), expected * 4);

        let restored = Network::read_weights(&mut &bytes[..], 4).unwrap();
        assert_eq!(restored.class_count(), 4);

        let probe = one_hot_sample(2, 0.5);
        let original = network.predict(&probe);
        let roundtrip = restored.predict(&probe);
        for (a, b) in original.iter().zip(&roundtrip) {
            // f32 storage loses precision.
            assert!((a - b).abs() < 1e-5);
        }
    }
}
