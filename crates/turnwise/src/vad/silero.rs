use super::error::{VadError, VadResult};
use super::{VadDetector, VadSession};
use crate::pcm;
use ndarray::{Array1, Array2, Array3};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const STATE_SHAPE: (usize, usize, usize) = (2, 1, 64);

/// Where the Silero ONNX file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    File(PathBuf),
    /// A file in a HuggingFace model repo. Resolving it needs the `model-hf` feature.
    HuggingFace {
        repo_id: String,
        filename: String,
        revision: Option<String>,
    },
}

impl ModelSource {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn from_hf(repo_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.into(),
            filename: filename.into(),
            revision: None,
        }
    }

    /// Pin a branch, tag or commit. No effect on local files.
    pub fn with_revision(mut self, rev: impl Into<String>) -> Self {
        if let Self::HuggingFace { revision, .. } = &mut self {
            *revision = Some(rev.into());
        }
        self
    }

    /// Local path of the model, fetching it into the HuggingFace cache first if needed.
    pub fn resolve(&self) -> Result<PathBuf, ModelSourceError> {
        match self {
            Self::File(path) if path.is_file() => Ok(path.clone()),
            Self::File(path) => Err(ModelSourceError::MissingFile(path.clone())),
            Self::HuggingFace {
                repo_id,
                filename,
                revision,
            } => {
                if repo_id.is_empty() {
                    return Err(ModelSourceError::Incomplete("repo_id"));
                }
                if filename.is_empty() {
                    return Err(ModelSourceError::Incomplete("filename"));
                }
                download(repo_id, filename, revision.as_deref().unwrap_or("main"))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelSourceError {
    #[error("Model file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("HuggingFace model source has an empty {0}")]
    Incomplete(&'static str),
    #[error("Downloading from HuggingFace requires the `model-hf` feature")]
    HubDisabled,
    #[error("HuggingFace download failed: {0}")]
    Download(String),
}

#[cfg(feature = "model-hf")]
fn download(repo_id: &str, filename: &str, revision: &str) -> Result<PathBuf, ModelSourceError> {
    use hf_hub::api::sync::ApiBuilder;
    use hf_hub::{Cache, Repo, RepoType};

    let failed = |err: hf_hub::api::sync::ApiError| ModelSourceError::Download(err.to_string());

    let mut builder = ApiBuilder::from_cache(Cache::from_env());
    if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
        builder = builder.with_endpoint(endpoint);
    }
    let token = std::env::var("HF_TOKEN")
        .or_else(|_| std::env::var("HUGGINGFACE_HUB_TOKEN"))
        .ok();
    if token.is_some() {
        builder = builder.with_token(token);
    }

    let repo = Repo::with_revision(repo_id.to_owned(), RepoType::Model, revision.to_owned());
    log::debug!("Fetching {filename} from {repo_id}@{revision}");
    builder.build().map_err(failed)?.repo(repo).get(filename).map_err(failed)
}

#[cfg(not(feature = "model-hf"))]
fn download(_repo_id: &str, _filename: &str, _revision: &str) -> Result<PathBuf, ModelSourceError> {
    Err(ModelSourceError::HubDisabled)
}

/// LSTM state carried from one frame to the next.
struct Recurrent {
    h: Array3<f32>,
    c: Array3<f32>,
}

impl Recurrent {
    fn zeroed() -> Self {
        Self {
            h: Array3::zeros(STATE_SHAPE),
            c: Array3::zeros(STATE_SHAPE),
        }
    }
}

/// Silero VAD backed by an ONNX model.
///
/// The model is recurrent. [`VadDetector::detect`] scores a frame from a zeroed state and
/// discards the result state; each [`VadDetector::session`] owns its own `h`/`c`, so a
/// stream's state is never touched by other callers. The ONNX session itself is shared and
/// runs one frame at a time.
pub struct SileroVad {
    session: Mutex<Session>,
    sample_rate: u32,
    channels: usize,
}

impl SileroVad {
    pub fn new(model_source: ModelSource, sample_rate: u32, channels: u16) -> VadResult<Self> {
        if sample_rate != 8000 && sample_rate != 16000 {
            return Err(VadError::UnsupportedSampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(VadError::InvalidInput("channels must be at least 1".to_string()));
        }
        let model_path = model_source.resolve()?;
        let session = load_session(&model_path)?;
        log::info!("Loaded Silero VAD model from {}", model_path.display());

        Ok(Self {
            session: Mutex::new(session),
            sample_rate,
            channels: channels as usize,
        })
    }

    pub fn from_file(path: impl Into<PathBuf>, sample_rate: u32, channels: u16) -> VadResult<Self> {
        Self::new(ModelSource::from_file(path), sample_rate, channels)
    }

    pub fn from_hf(
        repo_id: impl Into<String>,
        filename: impl Into<String>,
        sample_rate: u32,
        channels: u16,
    ) -> VadResult<Self> {
        Self::new(ModelSource::from_hf(repo_id, filename), sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn infer(&self, frame: &[u8], state: &mut Recurrent) -> VadResult<f32> {
        let samples = pcm::to_mono_f32(frame, self.channels);
        if samples.is_empty() {
            return Ok(0.0);
        }

        let input = Array2::from_shape_vec((1, samples.len()), samples)
            .map_err(|err| VadError::InvalidInput(err.to_string()))?;
        let input = Value::from_array(input).map_err(inference)?;
        let sr = Value::from_array(Array1::from_elem(1, self.sample_rate as i64))
            .map_err(inference)?;
        let h = Value::from_array(state.h.clone()).map_err(inference)?;
        let c = Value::from_array(state.c.clone()).map_err(inference)?;

        let mut session = self.lock();
        let outputs = session
            .run(ort::inputs![
                "input" => input,
                "sr" => sr,
                "h" => h,
                "c" => c
            ])
            .map_err(inference)?;

        let extract = |name: &str| -> VadResult<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| VadError::Inference(format!("missing output '{name}'")))?;
            let (_, data) = value.try_extract_tensor::<f32>().map_err(inference)?;
            Ok(data.to_vec())
        };
        let hn = extract("hn")?;
        let cn = extract("cn")?;
        let probability = extract("output")?.first().copied().unwrap_or(0.0);
        drop(outputs);
        drop(session);

        state.h = Array3::from_shape_vec(STATE_SHAPE, hn).map_err(inference)?;
        state.c = Array3::from_shape_vec(STATE_SHAPE, cn).map_err(inference)?;
        Ok(probability.clamp(0.0, 1.0))
    }
}

fn inference<E: ToString>(err: E) -> VadError {
    VadError::Inference(err.to_string())
}

fn model_load<E: ToString>(err: E) -> VadError {
    VadError::ModelLoad(err.to_string())
}

// Frames are scored one at a time under the session lock, so extra ORT threads buy nothing.
fn load_session(path: &Path) -> VadResult<Session> {
    Session::builder()
        .map_err(model_load)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_load)?
        .with_intra_threads(1)
        .map_err(model_load)?
        .with_inter_threads(1)
        .map_err(model_load)?
        .commit_from_file(path)
        .map_err(model_load)
}

impl VadDetector for SileroVad {
    fn name(&self) -> &str {
        "silero"
    }

    fn detect(&self, frame: &[u8]) -> VadResult<f32> {
        self.infer(frame, &mut Recurrent::zeroed())
    }

    fn session(&self) -> Box<dyn VadSession + '_> {
        Box::new(SileroSession {
            vad: self,
            state: Recurrent::zeroed(),
        })
    }
}

struct SileroSession<'a> {
    vad: &'a SileroVad,
    state: Recurrent,
}

impl VadSession for SileroSession<'_> {
    fn detect(&mut self, frame: &[u8]) -> VadResult<f32> {
        self.vad.infer(frame, &mut self.state)
    }
}
