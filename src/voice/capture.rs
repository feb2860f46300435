//! Speech capture boundary
//!
//! The capture source turns microphone audio into text on its own. The
//! controller only starts and stops it and consumes the events it emits.

use std::fmt;

use tokio::sync::mpsc;

/// Sender half handed to a capture source for delivering events
pub type CaptureEventSender = mpsc::UnboundedSender<CaptureEvent>;

/// Event emitted by a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Recognition is running
    Started,
    /// A transcript was recognized
    Result {
        /// Recognized text
        transcript: String,
        /// Whether the recognizer considers this result final
        is_final: bool,
    },
    /// Recognition stopped (deliberately or on its own)
    Ended,
    /// Recognition failed
    Errored(CaptureErrorCode),
}

/// Error codes reported by a capture source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorCode {
    /// Recognition was aborted on purpose
    Aborted,
    /// No speech was heard before the platform timeout
    NoSpeech,
    /// Audio capture failed
    AudioCapture,
    /// Network failure in a remote recognizer
    Network,
    /// Microphone permission denied
    NotAllowed,
    /// Recognition service refused the request
    ServiceNotAllowed,
    /// Requested locale not supported
    LanguageNotSupported,
    /// Any other platform code
    Other(String),
}

impl CaptureErrorCode {
    /// Parse a platform error code (e.g. `"no-speech"`)
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "aborted" => Self::Aborted,
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether capture should be restarted after this error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Aborted | Self::NotAllowed | Self::ServiceNotAllowed
        )
    }

    /// Whether this error means capture can never run in this session
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::ServiceNotAllowed)
    }
}

impl fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => write!(f, "aborted"),
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Network => write!(f, "network"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::ServiceNotAllowed => write!(f, "service-not-allowed"),
            Self::LanguageNotSupported => write!(f, "language-not-supported"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Failure of a start/stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Source was already in the requested state
    InvalidState,
    /// Any other failure
    Failed(String),
}

impl CaptureError {
    /// "Already started" / "already stopped" is not worth reporting
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::InvalidState)
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState => write!(f, "capture already in requested state"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

/// Continuous speech-to-text source
///
/// Implementations deliver [`CaptureEvent`]s through the sender passed to
/// [`CaptureSource::bind`]. `start` and `stop` request a state change; the
/// matching `Started`/`Ended` events confirm it.
pub trait CaptureSource: Send {
    /// Attach the event sender; called once before the first `start`
    fn bind(&mut self, events: CaptureEventSender);

    /// Request recognition to start
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidState`] if already running
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Request recognition to stop
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidState`] if already stopped
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Locale tag passed to the recognizer
    fn locale(&self) -> &str;
}

/// Start/stop wrapper over an optional capture source
///
/// Both operations are idempotent: "already in that state" failures are
/// swallowed, anything else is logged.
pub struct CaptureControl {
    source: super::Capability<Box<dyn CaptureSource>>,
}

impl CaptureControl {
    /// Wrap a capture capability, binding it to the event sender
    pub fn new(
        mut source: super::Capability<Box<dyn CaptureSource>>,
        events: CaptureEventSender,
    ) -> Self {
        match &mut source {
            super::Capability::Available(s) => {
                tracing::debug!(locale = s.locale(), "capture source bound");
                s.bind(events);
            }
            super::Capability::Unavailable(reason) => {
                tracing::warn!(reason = %reason, "speech capture unavailable, typed input only");
            }
        }

        Self { source }
    }

    /// Request capture to start
    pub fn start(&mut self) {
        let Some(source) = self.source.get_mut() else {
            return;
        };

        match source.start() {
            Ok(()) => tracing::debug!("capture start requested"),
            Err(e) if e.is_benign() => tracing::trace!("capture already running"),
            Err(e) => tracing::error!(error = %e, "capture start failed"),
        }
    }

    /// Request capture to stop
    pub fn stop(&mut self) {
        let Some(source) = self.source.get_mut() else {
            return;
        };

        match source.stop() {
            Ok(()) => tracing::debug!("capture stop requested"),
            Err(e) if e.is_benign() => tracing::trace!("capture already stopped"),
            Err(e) => tracing::warn!(error = %e, "capture stop failed"),
        }
    }

    /// Whether a capture source is attached
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.source.is_available()
    }
}
