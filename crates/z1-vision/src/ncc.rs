/// Standard deviation floor for sampled pixels (0-255 intensity units).
/// Keeps near-uniform samples from being stretched to unit variance.
pub const MIN_SAMPLE_STD: f32 = 2.0;

/// Mean and population standard deviation of pixel values
pub fn compute_stats(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Rescale to zero mean / unit variance. A flat input becomes all zeros.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let (mean, std_dev) = compute_stats(values);
    if std_dev < 1e-6 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std_dev).collect()
}

/// Zero-mean normalized cross-correlation of a raw sample against a template
/// already normalized to zero mean / unit variance. Returns a value in
/// [-1.0, 1.0]; a flat sample scores 0.0.
pub fn ncc_score(sample: &[f32], template: &[f32]) -> f32 {
    if sample.is_empty() || sample.len() != template.len() {
        return 0.0;
    }

    let (mean, std_dev) = compute_stats(sample);
    let std_dev = std_dev.max(MIN_SAMPLE_STD);
    let cross: f32 = sample
        .iter()
        .zip(template)
        .map(|(s, t)| (s - mean) * t)
        .sum();

    (cross / (std_dev * sample.len() as f32)).clamp(-1.0, 1.0)
}
