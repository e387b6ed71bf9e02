pub mod command;
pub mod playback;
pub mod record;
pub mod session;
pub mod spectral;
pub mod worker;

// Public API
pub use command::{AudioCommand, CommandFlag, FrameSink, ObservationSink};
pub use session::AudioSession;
pub use spectral::{FrequencyObservation, SpectralToneDetector};
pub use worker::AudioCommandWorker;

pub use tonewatch_foundation::config::AudioSettings;
