// Operator notification backends.
//
// The engine only needs `Notifier::notify`; which backend runs is decided by
// `NotifierKind` from settings or the command line.

use std::io::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::Severity;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification backend failed: {0}")]
    Backend(String),
    #[error("notifier `{0}` is not available in this build")]
    Unavailable(&'static str),
}

pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Signal one alert of the given severity. May block; callers run it off
    /// the evaluation path with a timeout.
    fn notify(&self, severity: Severity) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Bell,
    Audio,
    Silent,
}

pub fn build_notifier(kind: NotifierKind) -> Result<Box<dyn Notifier>, NotifyError> {
    match kind {
        NotifierKind::Log => Ok(Box::new(LogNotifier)),
        NotifierKind::Bell => Ok(Box::new(BellNotifier)),
        NotifierKind::Silent => Ok(Box::new(SilentNotifier)),
        #[cfg(feature = "audio")]
        NotifierKind::Audio => Ok(Box::new(audio::AudioNotifier)),
        #[cfg(not(feature = "audio"))]
        NotifierKind::Audio => Err(NotifyError::Unavailable("audio")),
    }
}

/// Tone pitch (Hz) and length for a severity: higher severity, higher and longer.
pub fn tone_for(severity: Severity) -> (f32, Duration) {
    let level = u64::from(severity.level());
    (
        600.0 + 200.0 * f32::from(severity.level()),
        Duration::from_millis(150 + 70 * level),
    )
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, severity: Severity) -> Result<(), NotifyError> {
        log::warn!("ALERT severity {}", severity);
        Ok(())
    }
}

/// Rings the terminal bell on stderr; twice for severity 4 and above.
pub struct BellNotifier;

impl Notifier for BellNotifier {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn notify(&self, severity: Severity) -> Result<(), NotifyError> {
        let rings = if severity >= Severity::HIGH { 2 } else { 1 };
        let mut stderr = std::io::stderr().lock();
        for _ in 0..rings {
            stderr
                .write_all(b"\x07")
                .map_err(|e| NotifyError::Backend(e.to_string()))?;
        }
        stderr
            .flush()
            .map_err(|e| NotifyError::Backend(e.to_string()))
    }
}

pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn notify(&self, _severity: Severity) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(feature = "audio")]
mod audio {
    use rodio::source::{SineWave, Source};

    use super::{tone_for, Notifier, NotifyError, Severity};

    /// Plays a sine tone on the default output device.
    pub struct AudioNotifier;

    impl Notifier for AudioNotifier {
        fn name(&self) -> &'static str {
            "audio"
        }

        fn notify(&self, severity: Severity) -> Result<(), NotifyError> {
            let stream = rodio::OutputStreamBuilder::open_default_stream()
                .map_err(|e| NotifyError::Backend(e.to_string()))?;
            let sink = rodio::Sink::connect_new(stream.mixer());
            let (frequency, length) = tone_for(severity);
            sink.append(SineWave::new(frequency).take_duration(length).amplify(0.25));
            sink.sleep_until_end();
            Ok(())
        }
    }
}
