//! Voice interaction
//!
//! Speech capture and output boundaries, wake phrase matching, and the
//! turn-taking state machine that arbitrates between them.

mod capture;
mod machine;
mod output;
mod wake_word;

pub use capture::{
    CaptureControl, CaptureError, CaptureErrorCode, CaptureEvent, CaptureEventSender,
    CaptureSource,
};
pub use machine::{
    Effect, FALLBACK_RESPONSE, Greeting, Input, Rejection, Timer, Timings, TurnMachine, TurnState,
};
pub use output::{
    SinkEvent, SinkEventSender, SpeechOutput, SpeechSink, Utterance, VoiceInfo, select_voice,
};
pub use wake_word::WakePhrase;

/// A platform capability that may be missing
///
/// Injected at construction so a session can degrade (e.g. to typed input
/// only) instead of failing when a speech service is absent.
pub enum Capability<T> {
    /// The capability is present
    Available(T),
    /// The capability is missing, with a reason for the logs
    Unavailable(String),
}

impl<T> Capability<T> {
    /// Whether the capability is present
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Mutable access to the capability if present
    pub const fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Available(inner) => Some(inner),
            Self::Unavailable(_) => None,
        }
    }
}

impl<T> std::fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(_) => write!(f, "Available"),
            Self::Unavailable(reason) => write!(f, "Unavailable({reason})"),
        }
    }
}
