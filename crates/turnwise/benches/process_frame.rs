use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime as TokioRuntime;
use tokio::sync::mpsc;
use turnwise::{AudioFrame, Pipeline, PipelineConfig, StreamContext, TimestampMode};

fn speech_frame(frame_size: usize) -> AudioFrame {
    let samples: Vec<i16> = (0..frame_size)
        .map(|i| ((i as f32 * 0.07).sin() * 12_000.0) as i16)
        .collect();
    AudioFrame::from_samples(&samples)
}

fn bench_process_frame(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let frame = speech_frame(config.frame_size);

    let plain = Pipeline::new(config.clone().with_denoise(false)).expect("pipeline");
    let gated = Pipeline::new(config.clone().with_denoise_model("gate")).expect("pipeline");

    let mut group = c.benchmark_group("process_frame");
    group.bench_function("energy", |b| {
        b.iter(|| black_box(plain.process_frame(black_box(&frame))).ok());
    });
    group.bench_function("energy_with_gate", |b| {
        b.iter(|| black_box(gated.process_frame(black_box(&frame))).ok());
    });
    group.finish();
}

fn bench_process_stream(c: &mut Criterion) {
    let runtime = TokioRuntime::new().expect("Failed to build tokio runtime");
    let config = PipelineConfig::default()
        .with_timestamp_mode(TimestampMode::Media)
        .with_silence_duration(Duration::from_millis(256));
    let pipeline = Pipeline::new(config.clone()).expect("pipeline");

    // Ten one-second utterances, each followed by 320 ms of silence.
    let speech = speech_frame(config.frame_size);
    let silence = AudioFrame::new(vec![0u8; config.frame_bytes()]);
    let frames: Vec<AudioFrame> = (0..10)
        .flat_map(|_| {
            std::iter::repeat_n(speech.clone(), 31).chain(std::iter::repeat_n(silence.clone(), 10))
        })
        .collect();

    c.bench_function("process_stream_10_turns", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let (tx, mut rx) = mpsc::channel(16);
                let input = tokio_stream::iter(frames.clone());
                let drain = async { while rx.recv().await.is_some() {} };
                let ctx = StreamContext::new();
                let (result, ()) = tokio::join!(pipeline.process_stream(&ctx, input, tx), drain);
                black_box(result).ok();
            })
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().configure_from_args();
    targets = bench_process_frame, bench_process_stream
}
criterion_main!(benches);
