//! Per-frame noise suppression.

mod gate;

pub use gate::{NoiseGate, NoiseGateConfig};

use bytes::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum DenoiseError {
    #[error("Denoised frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Denoise processing failed: {0}")]
    Processing(String),
}

pub type DenoiseResult<T> = Result<T, DenoiseError>;

/// Frame-in, frame-out noise suppressor.
///
/// `process` must return a buffer of exactly the input length; the pipeline checks this
/// and reports a mismatch as a denoise stage error.
pub trait Denoiser: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, frame: &Bytes) -> DenoiseResult<Bytes>;

    fn close(&self) -> DenoiseResult<()> {
        Ok(())
    }
}

/// Hands frames through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Denoiser for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn process(&self, frame: &Bytes) -> DenoiseResult<Bytes> {
        Ok(frame.clone())
    }
}

/// Run `denoiser` and verify the output length.
pub(crate) fn apply(denoiser: &dyn Denoiser, frame: &Bytes) -> DenoiseResult<Bytes> {
    let output = denoiser.process(frame)?;
    if output.len() != frame.len() {
        return Err(DenoiseError::LengthMismatch {
            expected: frame.len(),
            actual: output.len(),
        });
    }
    Ok(output)
}
