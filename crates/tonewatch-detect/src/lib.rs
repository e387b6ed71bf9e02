pub mod channel;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod listener;
pub mod parse;
pub mod poller;
pub mod source;
pub mod types;

// Core exports - grouped and sorted alphabetically
pub use channel::{AdbShellChannel, ChannelOutput, DeviceChannel};
pub use classifier::PresenceClassifier;
pub use config::ClassifierConfig;
pub use detector::{DeviceSpec, ToneDetector};
pub use listener::DetectionStateListener;
pub use parse::parse_measurement_line;
pub use poller::{DevicePollSource, DumpRing, PollerConfig};
pub use source::{run_detection_loop, FrameSource, LocalSpectralSource, PushHandle, PushSource};
pub use types::{
    FrequencyObservation, StateEvent, StateEventKind, ToneCallback, ToneEvent, ToneEventKind,
};
