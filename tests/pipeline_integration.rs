//! End-to-end pipeline tests with scripted collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use voxpipe::config::PipelineConfig;
use voxpipe::error::Result;
use voxpipe::llm::{FragmentSink, LanguageModel};
use voxpipe::pipeline::messages::Segment;
use voxpipe::pipeline::queue::{QueueReceiver, Received};
use voxpipe::pipeline::{Collaborators, Pipeline};
use voxpipe::segmenter::classifier::EnergyClassifier;
use voxpipe::server::Server;
use voxpipe::stt::SpeechRecognizer;
use voxpipe::tts::{ChunkSink, SpeechSynthesizer};

const RATE: u32 = 16_000;
/// Marker byte pattern the scripted synthesizer emits.
const REPLY_CHUNK: [u8; 8] = [0xAB; 8];

struct ScriptedRecognizer;

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn transcribe(&self, segment: &Segment) -> Result<String> {
        assert!(segment.duration_ms() >= 300, "segment too short to voice");
        Ok("what is the weather".to_owned())
    }
}

struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn reply(&mut self, prompt: &str, emit: &FragmentSink<'_>) -> Result<String> {
        assert_eq!(prompt, "what is the weather");
        emit("It is ".to_owned());
        emit("sunny.".to_owned());
        Ok("It is sunny.".to_owned())
    }
}

struct ScriptedSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, emit: &ChunkSink<'_>) -> Result<()> {
        assert_eq!(text, "It is sunny.");
        emit(Bytes::from_static(&REPLY_CHUNK));
        emit(Bytes::from_static(&REPLY_CHUNK));
        Ok(())
    }
}

fn collaborators(config: &PipelineConfig) -> Collaborators {
    Collaborators {
        classifier: Box::new(EnergyClassifier::new(
            config.audio.sample_rate,
            config.segmenter.energy_threshold,
        )),
        recognizer: Box::new(ScriptedRecognizer),
        language_model: Box::new(ScriptedModel),
        synthesizer: Box::new(ScriptedSynthesizer),
    }
}

fn pcm_bytes(amplitude: i16, ms: u64) -> Bytes {
    let samples = (ms * RATE as u64 / 1000) as usize;
    let mut out = Vec::with_capacity(samples * 2);
    for _ in 0..samples {
        out.extend_from_slice(&amplitude.to_le_bytes());
    }
    Bytes::from(out)
}

async fn next_within(
    rx: &mut QueueReceiver<Bytes>,
    deadline: Duration,
) -> Received<Bytes> {
    let started = std::time::Instant::now();
    loop {
        match rx.recv_timeout(Duration::from_millis(50)).await {
            Received::Empty if started.elapsed() < deadline => continue,
            other => return other,
        }
    }
}

#[tokio::test]
async fn utterance_flows_end_to_end() {
    let config = PipelineConfig::default();
    let mut pipeline = Pipeline::new(config.clone());
    pipeline.build(collaborators(&config)).unwrap();
    let input = pipeline.input().unwrap();
    let mut output = pipeline.take_output().unwrap();
    pipeline.start().unwrap();

    // One utterance: speech, then enough silence to close the segment.
    input.send(pcm_bytes(16_384, 500));
    input.send(pcm_bytes(0, 1000));

    let first = next_within(&mut output, Duration::from_secs(2)).await;
    assert_eq!(first, Received::Payload(Bytes::from_static(&REPLY_CHUNK)));
    let second = next_within(&mut output, Duration::from_secs(2)).await;
    assert_eq!(second, Received::Payload(Bytes::from_static(&REPLY_CHUNK)));

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn sentinel_cascades_to_the_tail() {
    let config = PipelineConfig::default();
    let mut pipeline = Pipeline::new(config.clone());
    pipeline.build(collaborators(&config)).unwrap();
    let input = pipeline.input().unwrap();
    let mut output = pipeline.take_output().unwrap();
    pipeline.start().unwrap();

    input.send_sentinel();

    let received = next_within(&mut output, Duration::from_secs(2)).await;
    assert_eq!(received, Received::Sentinel);

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn open_utterance_is_flushed_on_shutdown() {
    let config = PipelineConfig::default();
    let mut pipeline = Pipeline::new(config.clone());
    pipeline.build(collaborators(&config)).unwrap();
    let input = pipeline.input().unwrap();
    let mut output = pipeline.take_output().unwrap();
    pipeline.start().unwrap();

    // Speech with no trailing silence: the segment is still open when the
    // stream ends, and cleanup flushes it through the whole chain.
    input.send(pcm_bytes(16_384, 500));
    input.send_sentinel();

    let first = next_within(&mut output, Duration::from_secs(2)).await;
    assert_eq!(first, Received::Payload(Bytes::from_static(&REPLY_CHUNK)));

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn tcp_round_trip_returns_reply_audio() {
    let mut config = PipelineConfig::default();
    config.server.host = "127.0.0.1".to_owned();
    config.server.port = 0;

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(Arc::new(collaborators)));

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    client.write_all(&pcm_bytes(16_384, 500)).await.unwrap();
    client.write_all(&pcm_bytes(0, 1000)).await.unwrap();
    // Half-close: no more speech, but keep reading the reply.
    client.shutdown().await.unwrap();

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply.len(), REPLY_CHUNK.len() * 2);
    assert!(reply.iter().all(|&b| b == 0xAB));
}
