//! Signed 16-bit little-endian PCM helpers.

/// Bytes per PCM sample.
pub const SAMPLE_BYTES: usize = 2;

const FULL_SCALE: f32 = 32768.0;

/// Decode samples, ignoring a trailing odd byte.
pub fn samples(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Decode samples normalized to `[-1.0, 1.0)`.
pub fn to_f32(bytes: &[u8]) -> Vec<f32> {
    samples(bytes).map(|s| s as f32 / FULL_SCALE).collect()
}

/// Decode interleaved samples and average channels into mono.
pub fn to_mono_f32(bytes: &[u8], channels: usize) -> Vec<f32> {
    let samples = to_f32(bytes);
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Encode normalized samples, clamping to the representable range.
pub fn from_f32(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| (s * FULL_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .flat_map(i16::to_le_bytes)
        .collect()
}

pub fn from_i16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Root mean square of the decoded samples in full-scale units. Empty input yields zero.
pub fn rms(bytes: &[u8]) -> f32 {
    let (sum, count) = samples(bytes).fold((0.0f64, 0usize), |(sum, count), s| {
        let v = s as f64 / FULL_SCALE as f64;
        (sum + v * v, count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt() as f32
}
