use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_test::{assert_err, assert_ok};
use turnwise::{
    AudioFrame, EnergyVad, FrameLengthPolicy, Pipeline, PipelineConfig, PipelineError,
    RecordingMetrics, Stage, StreamContext, TimestampMode, TurnEndReason, TurnEvent, VadDetector,
    VadError, VadResult, VadSession,
};

const FRAME: Duration = Duration::from_millis(32);
const FRAME_BYTES: usize = 1024;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 16 kHz mono, 512-sample frames, media clock, 100 ms silence, no minimum speech.
fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_timestamp_mode(TimestampMode::Media)
        .with_silence_duration(Duration::from_millis(100))
        .with_min_speech_duration(Duration::ZERO)
}

fn loud() -> AudioFrame {
    let samples: Vec<i16> = (0..512)
        .map(|i| if i % 2 == 0 { 16_000 } else { -16_000 })
        .collect();
    AudioFrame::from_samples(&samples)
}

fn quiet() -> AudioFrame {
    AudioFrame::new(vec![0u8; FRAME_BYTES])
}

fn frames(pattern: &[(usize, bool)]) -> Vec<AudioFrame> {
    pattern
        .iter()
        .flat_map(|&(count, speech)| (0..count).map(move |_| if speech { loud() } else { quiet() }))
        .collect()
}

async fn run(pipeline: &Pipeline, input: Vec<AudioFrame>) -> (Result<(), PipelineError>, Vec<TurnEvent>) {
    let (tx, mut rx) = mpsc::channel(64);
    let result = pipeline
        .process_stream(&StreamContext::new(), tokio_stream::iter(input), tx)
        .await;
    let mut turns = Vec::new();
    while let Some(turn) = rx.recv().await {
        turns.push(turn);
    }
    (result, turns)
}

struct FlakyVad {
    inner: EnergyVad,
    calls: AtomicUsize,
    fail_on: usize,
}

impl VadDetector for FlakyVad {
    fn name(&self) -> &str {
        "flaky"
    }

    fn detect(&self, frame: &[u8]) -> VadResult<f32> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(VadError::Inference("transient failure".into()));
        }
        self.inner.detect(frame)
    }
}

/// Scores the first `speech_frames` frames of each stream as speech, whatever they hold.
/// Standalone scoring always reports silence.
struct ScriptedVad {
    speech_frames: usize,
}

struct Script {
    remaining: usize,
}

impl VadDetector for ScriptedVad {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&self, _frame: &[u8]) -> VadResult<f32> {
        Ok(0.0)
    }

    fn session(&self) -> Box<dyn VadSession + '_> {
        Box::new(Script {
            remaining: self.speech_frames,
        })
    }
}

impl VadSession for Script {
    fn detect(&mut self, _frame: &[u8]) -> VadResult<f32> {
        if self.remaining == 0 {
            return Ok(0.0);
        }
        self.remaining -= 1;
        Ok(1.0)
    }
}

#[tokio::test]
async fn speech_then_silence_yields_one_turn() {
    init_logger();
    let pipeline = Pipeline::new(config()).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(20, true), (10, false)])).await;

    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    let turn = &turns[0];
    assert_eq!(turn.reason, TurnEndReason::Silence);
    assert_eq!(turn.audio.len(), 24 * FRAME_BYTES);
    assert_eq!(turn.start, Duration::ZERO);
    assert_eq!(turn.end, FRAME * 23);
    assert_eq!(turn.duration, turn.end - turn.start);
    assert!(!pipeline.is_streaming());
    assert!(!pipeline.is_speaking());
}

#[tokio::test]
async fn silence_only_yields_nothing() {
    let pipeline = Pipeline::new(config()).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(3, false)])).await;
    assert_ok!(result);
    assert!(turns.is_empty());
}

#[tokio::test]
async fn end_of_input_flushes_open_turn() {
    let pipeline = Pipeline::new(config().with_silence_duration(Duration::from_secs(1))).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(10, true), (2, false)])).await;

    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].reason, TurnEndReason::Silence);
    assert_eq!(turns[0].audio.len(), 12 * FRAME_BYTES);
    // Closed at the end of the last frame.
    assert_eq!(turns[0].end, FRAME * 12);
    assert_eq!(pipeline.buffered_bytes(), 0);
}

#[tokio::test]
async fn continuous_speech_is_cut_at_max_length() {
    let pipeline =
        Pipeline::new(config().with_max_speech_duration(Duration::from_millis(320))).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(30, true)])).await;

    assert_ok!(result);
    let reasons: Vec<_> = turns.iter().map(|t| t.reason).collect();
    assert_eq!(
        reasons,
        vec![
            TurnEndReason::MaxLength,
            TurnEndReason::MaxLength,
            TurnEndReason::Silence
        ]
    );
    assert_eq!(turns[0].audio.len(), 11 * FRAME_BYTES);
    assert_eq!(turns[1].start, FRAME * 11);
    assert_eq!(turns[2].audio.len(), 8 * FRAME_BYTES);
}

#[tokio::test]
async fn short_burst_waits_for_min_speech_duration() {
    let pipeline =
        Pipeline::new(config().with_min_speech_duration(Duration::from_millis(500))).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(3, true), (20, false)])).await;

    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    // 128 ms of silence is reached at frame 6, but the turn cannot close before 512 ms.
    assert_eq!(turns[0].end, FRAME * 16);
    assert_eq!(turns[0].audio.len(), 17 * FRAME_BYTES);
}

#[tokio::test]
async fn malformed_frame_keeps_turn_sample_aligned() {
    let pipeline =
        Pipeline::new(config().with_frame_length_policy(FrameLengthPolicy::Silence)).unwrap();
    let mut input = frames(&[(2, true)]);
    input.push(AudioFrame::new(vec![0x7Fu8; 101]));
    input.extend(frames(&[(2, true), (6, false)]));

    let (result, turns) = run(&pipeline, input).await;
    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    let audio = &turns[0].audio;
    // Loud, loud, stand-in, loud, loud, then five silent frames up to 128 ms of silence.
    assert_eq!(audio.len(), 10 * FRAME_BYTES);
    assert!(audio[2 * FRAME_BYTES..3 * FRAME_BYTES].iter().all(|&b| b == 0));
    let first = i16::from_le_bytes([audio[3 * FRAME_BYTES], audio[3 * FRAME_BYTES + 1]]);
    assert_eq!(first, 16_000);
    assert_eq!(turns[0].end, FRAME * 9);
}

#[tokio::test]
async fn turns_arrive_in_order_under_backpressure() {
    let pipeline = Pipeline::new(config()).unwrap();
    let input = frames(&[(5, true), (5, false), (5, true), (5, false), (5, true), (5, false)]);
    let (tx, mut rx) = mpsc::channel(1);

    let consumer = async {
        let mut turns = Vec::new();
        while let Some(turn) = rx.recv().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
            turns.push(turn);
        }
        turns
    };
    let ctx = StreamContext::new();
    let (result, turns) = tokio::join!(
        pipeline.process_stream(&ctx, tokio_stream::iter(input), tx),
        consumer
    );

    assert_ok!(result);
    let starts: Vec<_> = turns.iter().map(|t| t.start).collect();
    assert_eq!(starts, vec![Duration::ZERO, FRAME * 10, FRAME * 20]);
}

#[tokio::test]
async fn second_stream_is_rejected_while_first_runs() {
    let pipeline = Arc::new(Pipeline::new(config()).unwrap());
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (turn_tx, mut turn_rx) = mpsc::channel(8);

    let first = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move {
            pipeline
                .process_stream(&StreamContext::new(), ReceiverStream::new(frame_rx), turn_tx)
                .await
        }
    });
    while !pipeline.is_streaming() {
        tokio::task::yield_now().await;
    }

    let (other_tx, _other_rx) = mpsc::channel(1);
    let err = pipeline
        .process_stream(&StreamContext::new(), tokio_stream::iter(frames(&[(5, true)])), other_tx)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Concurrency));

    // The first stream is unaffected.
    for frame in frames(&[(20, true), (10, false)]) {
        frame_tx.send(frame).await.unwrap();
    }
    drop(frame_tx);
    assert_ok!(first.await.unwrap());
    let turn = turn_rx.recv().await.unwrap();
    assert_eq!(turn.audio.len(), 24 * FRAME_BYTES);
    assert!(!pipeline.is_streaming());
}

#[tokio::test]
async fn cancellation_mid_utterance_emits_nothing() {
    let pipeline = Arc::new(Pipeline::new(config()).unwrap());
    let ctx = StreamContext::new();
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (turn_tx, mut turn_rx) = mpsc::channel(8);

    let task = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        let ctx = ctx.clone();
        async move {
            pipeline
                .process_stream(&ctx, ReceiverStream::new(frame_rx), turn_tx)
                .await
        }
    });

    for frame in frames(&[(5, true)]) {
        frame_tx.send(frame).await.unwrap();
    }
    while pipeline.buffered_bytes() < 5 * FRAME_BYTES {
        tokio::task::yield_now().await;
    }
    ctx.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert!(err.is_cancellation());
    assert!(turn_rx.recv().await.is_none());
    assert!(!pipeline.is_speaking());
    assert!(!pipeline.is_streaming());
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_an_idle_stream() {
    let pipeline = Pipeline::new(config()).unwrap();
    let ctx = StreamContext::new().with_timeout(Duration::from_secs(1));
    let (tx, _rx) = mpsc::channel(1);

    let result = pipeline
        .process_stream(&ctx, futures::stream::pending::<AudioFrame>(), tx)
        .await;
    assert!(matches!(result, Err(PipelineError::DeadlineExceeded)));
}

#[tokio::test]
async fn stage_error_skips_frame_and_continues() {
    let metrics = Arc::new(RecordingMetrics::new());
    let pipeline = Pipeline::builder(config())
        .vad(Arc::new(FlakyVad {
            inner: EnergyVad::default(),
            calls: AtomicUsize::new(0),
            fail_on: 3,
        }))
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let (result, turns) = run(&pipeline, frames(&[(20, true), (10, false)])).await;
    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    // One speech frame was dropped.
    assert_eq!(turns[0].audio.len(), 23 * FRAME_BYTES);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.errors(Stage::Vad), 1);
    assert_eq!(snapshot.speech_segments, 1);
    assert_eq!(snapshot.turns_silence, 1);
}

#[tokio::test]
async fn dropped_receiver_is_reported() {
    let pipeline = Pipeline::new(config()).unwrap();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let result = pipeline
        .process_stream(
            &StreamContext::new(),
            tokio_stream::iter(frames(&[(20, true), (10, false)])),
            tx,
        )
        .await;
    assert!(matches!(result, Err(PipelineError::TurnSinkClosed)));
    assert!(!pipeline.is_streaming());
}

#[tokio::test]
async fn pipeline_is_reusable_across_streams() {
    let pipeline = Pipeline::new(config()).unwrap();
    for _ in 0..2 {
        let (result, turns) = run(&pipeline, frames(&[(20, true), (10, false)])).await;
        assert_ok!(result);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].start, Duration::ZERO);
    }
}

#[tokio::test]
async fn arrival_clock_flushes_fast_input_as_one_turn() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let (result, turns) = run(&pipeline, frames(&[(5, true), (3, false)])).await;
    assert_ok!(result);
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].reason, TurnEndReason::Silence);
    assert_eq!(turns[0].audio.len(), 8 * FRAME_BYTES);
}

#[tokio::test]
async fn closed_pipeline_refuses_streams() {
    let pipeline = Pipeline::new(config()).unwrap();
    assert_ok!(pipeline.close());
    let (tx, _rx) = mpsc::channel(1);
    let result = pipeline
        .process_stream(&StreamContext::new(), tokio_stream::iter(Vec::new()), tx)
        .await;
    assert!(matches!(assert_err!(result), PipelineError::Closed));
}

#[tokio::test]
async fn process_frame_leaves_stream_detector_state_alone() {
    let pipeline = Arc::new(
        Pipeline::builder(config())
            .vad(Arc::new(ScriptedVad { speech_frames: 10 }))
            .build()
            .unwrap(),
    );

    for _ in 0..2 {
        let (frame_tx, frame_rx) = mpsc::channel(1);
        let (turn_tx, mut turn_rx) = mpsc::channel(8);
        let stream = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move {
                pipeline
                    .process_stream(&StreamContext::new(), ReceiverStream::new(frame_rx), turn_tx)
                    .await
            }
        });

        for frame in frames(&[(20, false)]) {
            frame_tx.send(frame).await.unwrap();
            for _ in 0..3 {
                let decision = pipeline.process_frame(&quiet()).unwrap();
                assert!(!decision.is_speech);
            }
        }
        drop(frame_tx);
        assert_ok!(stream.await.unwrap());

        let turn = turn_rx.recv().await.unwrap();
        assert_eq!(turn.start, Duration::ZERO);
        assert_eq!(turn.end, FRAME * 14);
        assert_eq!(turn.audio.len(), 15 * FRAME_BYTES);
        assert!(turn_rx.recv().await.is_none());
    }
}
