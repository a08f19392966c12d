//! Error types for the voxpipe pipeline.

/// Top-level error type for the voice-dialogue system.
///
/// Per-item stage failures are values of this type as well: the stage run
/// loop logs them and drops the offending item instead of terminating.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or unconvertible audio data.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech/silence frame classification error.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Segmentation state machine error.
    #[error("segmenter error: {0}")]
    Segmenter(String),

    /// Speech recognition collaborator error.
    #[error("ASR error: {0}")]
    Asr(String),

    /// Language model collaborator error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Speech synthesis collaborator error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Pipeline lifecycle contract violation (start before build, double
    /// stop, ...). Fatal to the call, never to the process.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Connection-level transport error; tears down one pipeline instance.
    #[error("transport error: {0}")]
    Transport(String),

    /// Inter-stage channel error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP collaborator transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PipelineError>;
