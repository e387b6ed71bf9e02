use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Audio session has been finalized")]
    SessionClosed,

    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("Worker did not exit within {timeout:?}")]
    JoinTimeout { timeout: Duration },

    #[error("CPAL error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Default stream config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Malformed measurement line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("Device channel failure: {stderr}")]
    Channel { stderr: String },

    #[error("Device channel I/O error: {0}")]
    ChannelIo(#[from] std::io::Error),

    #[error("Listener stopped")]
    ListenerStopped,

    #[error("No detection running for {target}")]
    NoSuchDetection { target: String },

    #[error("Frame source not started")]
    SourceNotStarted,

    #[error("Audio source error: {0}")]
    AudioSource(String),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}

impl DetectError {
    pub fn parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            reason: reason.into(),
        }
    }
}
