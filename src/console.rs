//! Console speech adapters
//!
//! Stand-ins for the platform speech services when running in a terminal:
//! replies are printed and "finish" after a reading-pace delay, and lines
//! fed to [`ConsoleMic`] arrive as final recognition results.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::voice::{
    CaptureError, CaptureEvent, CaptureEventSender, CaptureSource, SinkEvent, SinkEventSender,
    SpeechSink, Utterance, VoiceInfo,
};

const MS_PER_CHAR: u64 = 30;
const MIN_SPEECH: Duration = Duration::from_millis(300);
const MAX_SPEECH: Duration = Duration::from_secs(4);

/// How long an utterance of `text` takes to "play"
#[must_use]
pub fn reading_time(text: &str) -> Duration {
    let chars = u64::try_from(text.chars().count()).unwrap_or(u64::MAX);
    Duration::from_millis(chars.saturating_mul(MS_PER_CHAR)).clamp(MIN_SPEECH, MAX_SPEECH)
}

/// Prints utterances to stdout
#[derive(Default)]
pub struct ConsoleSink {
    events: Option<SinkEventSender>,
    playing: Option<JoinHandle<()>>,
}

impl ConsoleSink {
    /// Create an unbound sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechSink for ConsoleSink {
    fn bind(&mut self, events: SinkEventSender) {
        self.events = Some(events);
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn speak(&mut self, utterance: Utterance) -> crate::Result<()> {
        let Some(events) = self.events.clone() else {
            return Err(crate::Error::Speech("sink not bound".to_string()));
        };

        println!("veda> {}", utterance.text);

        let delay = reading_time(&utterance.text);
        let id = utterance.id;
        self.playing = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SinkEvent::Ended { id });
        }));
        Ok(())
    }

    fn cancel_all(&mut self) {
        if let Some(playing) = self.playing.take() {
            playing.abort();
        }
    }
}

#[derive(Default)]
struct MicState {
    events: Option<CaptureEventSender>,
    running: bool,
}

/// Capture source fed from console lines
pub struct ConsoleCapture {
    state: Arc<Mutex<MicState>>,
    locale: String,
}

/// Feeds "heard" lines into a [`ConsoleCapture`]
#[derive(Clone)]
pub struct ConsoleMic {
    state: Arc<Mutex<MicState>>,
}

impl ConsoleCapture {
    /// Create a capture source and the handle that feeds it
    #[must_use]
    pub fn new(locale: impl Into<String>) -> (Self, ConsoleMic) {
        let state = Arc::new(Mutex::new(MicState::default()));
        let mic = ConsoleMic {
            state: Arc::clone(&state),
        };
        (
            Self {
                state,
                locale: locale.into(),
            },
            mic,
        )
    }
}

impl CaptureSource for ConsoleCapture {
    fn bind(&mut self, events: CaptureEventSender) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events = Some(events);
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.running {
            return Err(CaptureError::InvalidState);
        }
        state.running = true;
        if let Some(events) = &state.events {
            let _ = events.send(CaptureEvent::Started);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.running {
            return Err(CaptureError::InvalidState);
        }
        state.running = false;
        if let Some(events) = &state.events {
            let _ = events.send(CaptureEvent::Ended);
        }
        Ok(())
    }

    fn locale(&self) -> &str {
        &self.locale
    }
}

impl ConsoleMic {
    /// Deliver `text` as a final result; returns false when capture is off
    #[must_use]
    pub fn hear(&self, text: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(events) = state.events.as_ref().filter(|_| state.running) else {
            return false;
        };
        events
            .send(CaptureEvent::Result {
                transcript: text.to_string(),
                is_final: true,
            })
            .is_ok()
    }
}
