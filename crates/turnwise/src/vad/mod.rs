//! Voice Activity Detection.

mod energy;
mod error;
#[cfg(feature = "silero")]
mod silero;

pub use energy::{EnergyVad, EnergyVadConfig};
pub use error::{VadError, VadResult};
#[cfg(feature = "silero")]
pub use silero::{ModelSource, ModelSourceError, SileroVad};

/// Frame classifier. Implementations are interchangeable behind the turn detector.
///
/// `detect` receives interleaved signed 16-bit little-endian PCM and returns a speech
/// probability in `[0, 1]`. Empty or truncated frames must score `0.0` rather than fail.
/// `detect` never carries state between calls, so concurrent callers cannot affect each
/// other; per-stream state lives in the [`VadSession`] returned by `session`.
pub trait VadDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Score one frame on its own.
    fn detect(&self, frame: &[u8]) -> VadResult<f32>;

    /// Scorer for one stream. The pipeline opens one per `process_stream` call and drops it
    /// when the stream ends.
    fn session(&self) -> Box<dyn VadSession + '_> {
        Box::new(Stateless(self))
    }

    /// Release held resources.
    fn close(&self) -> VadResult<()> {
        Ok(())
    }
}

/// Frame scorer owned by a single stream, holding whatever state the model carries from
/// one frame to the next.
pub trait VadSession: Send {
    fn detect(&mut self, frame: &[u8]) -> VadResult<f32>;
}

struct Stateless<'a, D: ?Sized>(&'a D);

impl<D: VadDetector + ?Sized> VadSession for Stateless<'_, D> {
    fn detect(&mut self, frame: &[u8]) -> VadResult<f32> {
        self.0.detect(frame)
    }
}
