use spectrascope_api::channel::{ChannelId, ChannelReadings};

/// Classifier input width: the 12 channels in fixed order.
pub const FEATURE_LEN: usize = ChannelId::ALL.len();

/// Extracts the 12 channel values in fixed order; missing channels become
/// zero.
pub fn feature_vector(channels: &ChannelReadings) -> Vec<f64> {
    ChannelId::ALL
        .iter()
        .map(|ch| channels.get(ch).copied().unwrap_or(0.0))
        .collect()
}

/// L2 normalization. Large raw sensor counts would otherwise saturate the
/// softmax during training. A zero vector is left unchanged (the norm
/// divisor falls back to 1).
pub fn l2_normalize(mut features: Vec<f64>) -> Vec<f64> {
    let norm = features.iter().map(|v| v * v).sum::<f64>().sqrt();
    let divisor = if norm == 0.0 { 1.0 } else { norm };

    for value in &mut features {
        *value /= divisor;
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_missing_channels_are_zero() {
        let sparse: ChannelReadings = [(ChannelId::Band410, 3.0), (ChannelId::Clear, 9.0)]
            .into_iter()
            .collect();

        let features = feature_vector(&sparse);
        assert_eq!(features.len(), FEATURE_LEN);
        assert_eq!(features[0], 3.0);
        assert_eq!(features[11], 9.0);
        assert!(features[1..11].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let normalized = l2_normalize(vec![3.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let norm: f64 = normalized.iter().map(|v| v * v).sum::<f64>().sqrt();

        assert!((norm - 1.0).abs() < 1e-12);
        assert!((normalized[0] - 0.6).abs() < 1e-12);
        assert!((normalized[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_l2_normalize_zero_vector_is_unchanged() {
        let zeros = vec![0.0; FEATURE_LEN];
        assert_eq!(l2_normalize(zeros.clone()), zeros);
    }
}
