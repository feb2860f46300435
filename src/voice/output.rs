//! Speech output boundary
//!
//! The sink renders text to audio. [`SpeechOutput`] wraps it as a
//! single-slot player: every new utterance cancels the previous one.

use tokio::sync::mpsc;

use super::Capability;

/// Sender half handed to a speech sink for delivering events
pub type SinkEventSender = mpsc::UnboundedSender<SinkEvent>;

/// Event emitted by a speech sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The utterance with this id finished playing
    Ended {
        /// Utterance id from [`Utterance::id`]
        id: u64,
    },
}

/// A platform voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Voice name as reported by the platform
    pub name: String,
    /// BCP 47 locale tag (e.g. "hi-IN")
    pub lang: String,
}

impl VoiceInfo {
    /// Create a voice description
    #[must_use]
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One request to speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Echoed back in [`SinkEvent::Ended`]
    pub id: u64,
    /// Text to speak
    pub text: String,
    /// Requested locale
    pub locale: String,
    /// Chosen voice, `None` for the platform default
    pub voice: Option<VoiceInfo>,
}

/// Text-to-speech sink
///
/// `speak` is fire-and-forget; completion arrives as [`SinkEvent::Ended`]
/// through the sender passed to [`SpeechSink::bind`].
pub trait SpeechSink: Send {
    /// Attach the event sender; called once before the first `speak`
    fn bind(&mut self, events: SinkEventSender);

    /// Voices the platform offers
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Start speaking
    ///
    /// # Errors
    ///
    /// Returns error if the platform refuses the utterance
    fn speak(&mut self, utterance: Utterance) -> crate::Result<()>;

    /// Drop anything queued or playing; a no-op when idle
    fn cancel_all(&mut self);
}

/// Pick a voice for a locale: exact tag, then same language, else default
#[must_use]
pub fn select_voice(voices: &[VoiceInfo], locale: &str) -> Option<VoiceInfo> {
    if let Some(exact) = voices.iter().find(|v| v.lang.eq_ignore_ascii_case(locale)) {
        return Some(exact.clone());
    }

    let language = locale.split(['-', '_']).next().unwrap_or(locale);
    voices
        .iter()
        .find(|v| {
            v.lang
                .split(['-', '_'])
                .next()
                .is_some_and(|l| l.eq_ignore_ascii_case(language))
        })
        .cloned()
}

/// Single-slot speech player over an optional sink
pub struct SpeechOutput {
    sink: Capability<Box<dyn SpeechSink>>,
    locale: String,
    events: SinkEventSender,
}

impl SpeechOutput {
    /// Wrap a sink capability, binding it to the event sender
    pub fn new(
        mut sink: Capability<Box<dyn SpeechSink>>,
        locale: impl Into<String>,
        events: SinkEventSender,
    ) -> Self {
        match &mut sink {
            Capability::Available(s) => s.bind(events.clone()),
            Capability::Unavailable(reason) => {
                tracing::warn!(reason = %reason, "speech output unavailable, replies will be text only");
            }
        }

        Self {
            sink,
            locale: locale.into(),
            events,
        }
    }

    /// Speak text, pre-empting whatever is playing
    ///
    /// Without a working sink the utterance completes immediately so the
    /// turn still closes.
    pub fn speak(&mut self, id: u64, text: &str) {
        let Some(sink) = self.sink.get_mut() else {
            let _ = self.events.send(SinkEvent::Ended { id });
            return;
        };

        sink.cancel_all();

        let voice = select_voice(&sink.voices(), &self.locale);
        tracing::debug!(id, voice = ?voice.as_ref().map(|v| &v.name), "speaking");

        let utterance = Utterance {
            id,
            text: text.to_string(),
            locale: self.locale.clone(),
            voice,
        };

        if let Err(e) = sink.speak(utterance) {
            tracing::warn!(error = %e, id, "speech failed, completing utterance");
            let _ = self.events.send(SinkEvent::Ended { id });
        }
    }

    /// Cancel any utterance
    pub fn cancel(&mut self) {
        if let Some(sink) = self.sink.get_mut() {
            sink.cancel_all();
        }
    }

    /// Whether a real sink is attached
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.sink.is_available()
    }

    /// Locale used for utterances
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }
}
