use super::TARGET_RATE;

/// Linear-interpolation resampler for voice payloads.
///
/// Output index `i` reads source position `i * (source_rate / target_rate)`,
/// blending the two bracketing samples with the upper index clamped to the end
/// of the input. No anti-alias filtering: the payload feeds a language model,
/// not a loudspeaker.
pub fn resample_linear(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    // Guard rails
    if source_rate == 0 || target_rate == 0 {
        return input.to_vec();
    }
    if input.is_empty() || source_rate == target_rate {
        return input.to_vec();
    }

    let ratio = f64::from(source_rate) / f64::from(target_rate);
    let output_len =
        (input.len() as u64 * u64::from(target_rate) / u64::from(source_rate)) as usize;
    let last = input.len() - 1;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let lower = (src_idx.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        let frac = src_idx - lower as f64;
        let sample = f64::from(input[lower]) * (1.0 - frac) + f64::from(input[upper]) * frac;
        output.push(sample as f32);
    }

    output
}

/// Resample to the fixed payload rate.
pub fn resample_to_target_rate(input: &[f32], source_rate: u32) -> Vec<f32> {
    resample_linear(input, source_rate, TARGET_RATE)
}
