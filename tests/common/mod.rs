//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use veda_assistant::actions::{ResourceLocator, ResourceOpener};
use veda_assistant::session::{self, Devices, Services, SessionHandle, SessionOptions};
use veda_assistant::voice::{
    Capability, CaptureError, CaptureErrorCode, CaptureEvent, CaptureEventSender, CaptureSource,
    SinkEvent, SinkEventSender, SpeechSink, Utterance, VoiceInfo,
};
use veda_assistant::{Command, CommandResolver, Error, HistoryStore, Result, UserContext, UserProfile};

/// Let spawned tasks run; advances paused time by a millisecond
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Profile with wake phrase "Veda"
#[must_use]
pub fn profile(history: &[&str]) -> UserProfile {
    UserProfile {
        name: Some("Asha".to_string()),
        assistant_name: Some("Veda".to_string()),
        history: history.iter().map(ToString::to_string).collect(),
    }
}

#[derive(Default)]
struct CaptureState {
    events: Option<CaptureEventSender>,
    running: bool,
    starts: usize,
    stops: usize,
}

/// Capture source that confirms start/stop immediately
pub struct FakeCapture {
    state: Arc<Mutex<CaptureState>>,
}

/// Test-side control of a [`FakeCapture`]
#[derive(Clone)]
pub struct CaptureRemote {
    state: Arc<Mutex<CaptureState>>,
}

#[must_use]
pub fn fake_capture() -> (FakeCapture, CaptureRemote) {
    let state = Arc::new(Mutex::new(CaptureState::default()));
    (
        FakeCapture {
            state: Arc::clone(&state),
        },
        CaptureRemote { state },
    )
}

impl CaptureSource for FakeCapture {
    fn bind(&mut self, events: CaptureEventSender) {
        self.state.lock().unwrap().events = Some(events);
    }

    fn start(&mut self) -> std::result::Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        if state.running {
            return Err(CaptureError::InvalidState);
        }
        state.running = true;
        state.starts += 1;
        state.events.as_ref().unwrap().send(CaptureEvent::Started).unwrap();
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Err(CaptureError::InvalidState);
        }
        state.running = false;
        state.stops += 1;
        let _ = state.events.as_ref().unwrap().send(CaptureEvent::Ended);
        Ok(())
    }

    fn locale(&self) -> &str {
        "en-US"
    }
}

impl CaptureRemote {
    /// Deliver a final transcript
    pub fn hear(&self, text: &str) {
        self.emit(CaptureEvent::Result {
            transcript: text.to_string(),
            is_final: true,
        });
    }

    /// Recognition stopped on its own
    pub fn end(&self) {
        self.state.lock().unwrap().running = false;
        self.emit(CaptureEvent::Ended);
    }

    /// Recognition failed with `code`, followed by the end event
    pub fn fail(&self, code: CaptureErrorCode) {
        self.state.lock().unwrap().running = false;
        self.emit(CaptureEvent::Errored(code));
        self.emit(CaptureEvent::Ended);
    }

    #[must_use]
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    fn emit(&self, event: CaptureEvent) {
        let state = self.state.lock().unwrap();
        let _ = state.events.as_ref().unwrap().send(event);
    }
}

#[derive(Default)]
struct SinkState {
    events: Option<SinkEventSender>,
    spoken: Vec<Utterance>,
    cancels: usize,
}

/// Speech sink that plays until told to finish
pub struct FakeSink {
    state: Arc<Mutex<SinkState>>,
}

/// Test-side control of a [`FakeSink`]
#[derive(Clone)]
pub struct SinkRemote {
    state: Arc<Mutex<SinkState>>,
}

#[must_use]
pub fn fake_sink() -> (FakeSink, SinkRemote) {
    let state = Arc::new(Mutex::new(SinkState::default()));
    (
        FakeSink {
            state: Arc::clone(&state),
        },
        SinkRemote { state },
    )
}

impl SpeechSink for FakeSink {
    fn bind(&mut self, events: SinkEventSender) {
        self.state.lock().unwrap().events = Some(events);
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo::new("Lekha", "hi-IN")]
    }

    fn speak(&mut self, utterance: Utterance) -> Result<()> {
        self.state.lock().unwrap().spoken.push(utterance);
        Ok(())
    }

    fn cancel_all(&mut self) {
        self.state.lock().unwrap().cancels += 1;
    }
}

impl SinkRemote {
    /// Signal the end of the most recent utterance
    pub fn finish(&self) {
        let state = self.state.lock().unwrap();
        let id = state.spoken.last().expect("nothing spoken").id;
        state
            .events
            .as_ref()
            .unwrap()
            .send(SinkEvent::Ended { id })
            .unwrap();
    }

    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .spoken
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    #[must_use]
    pub fn last(&self) -> Option<Utterance> {
        self.state.lock().unwrap().spoken.last().cloned()
    }
}

/// Resolver answering from a script, optionally held behind a gate
#[derive(Default)]
pub struct FakeResolver {
    script: Mutex<VecDeque<std::result::Result<Command, String>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl FakeResolver {
    #[must_use]
    pub fn answering(results: Vec<std::result::Result<Command, String>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// Hold each call until the returned `Notify` is signalled
    #[must_use]
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandResolver for FakeResolver {
    async fn resolve(&self, query: &str, _context: &UserContext) -> Result<Command> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(command)) => Ok(command),
            Some(Err(reason)) => Err(Error::Resolver(reason)),
            None => Ok(Command::new("general", "", "ok")),
        }
    }
}

/// History store recording every write
#[derive(Default)]
pub struct FakeStore {
    pub appended: Mutex<Vec<String>>,
    pub replaced: Mutex<Vec<Vec<String>>>,
    pub logouts: Mutex<usize>,
    pub fail: bool,
}

#[async_trait]
impl HistoryStore for FakeStore {
    async fn append_history(&self, entry: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Persistence("offline".to_string()));
        }
        self.appended.lock().unwrap().push(entry.to_string());
        Ok(())
    }

    async fn replace_history(&self, history: &[String]) -> Result<()> {
        if self.fail {
            return Err(Error::Persistence("offline".to_string()));
        }
        self.replaced.lock().unwrap().push(history.to_vec());
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        *self.logouts.lock().unwrap() += 1;
        if self.fail {
            return Err(Error::Persistence("offline".to_string()));
        }
        Ok(())
    }
}

/// Opener recording locators
#[derive(Default)]
pub struct FakeOpener {
    pub opened: Mutex<Vec<ResourceLocator>>,
}

#[async_trait]
impl ResourceOpener for FakeOpener {
    async fn open(&self, locator: &ResourceLocator) -> Result<()> {
        self.opened.lock().unwrap().push(locator.clone());
        Ok(())
    }
}

/// A running session with handles on every fake
pub struct Harness {
    pub handle: SessionHandle,
    pub capture: CaptureRemote,
    pub sink: SinkRemote,
    pub resolver: Arc<FakeResolver>,
    pub store: Arc<FakeStore>,
    pub opener: Arc<FakeOpener>,
}

/// Options with the greeting disabled
#[must_use]
pub fn quiet() -> SessionOptions {
    SessionOptions {
        greeting: false,
        ..SessionOptions::default()
    }
}

/// Spawn a session with fake capture and sink
#[must_use]
pub fn harness(
    profile: &UserProfile,
    resolver: FakeResolver,
    store: FakeStore,
    options: SessionOptions,
) -> Harness {
    let (capture_source, capture) = fake_capture();
    let (sink_device, sink) = fake_sink();
    let resolver = Arc::new(resolver);
    let store = Arc::new(store);
    let opener = Arc::new(FakeOpener::default());

    let handle = session::spawn(
        profile,
        Devices {
            capture: Capability::Available(Box::new(capture_source)),
            sink: Capability::Available(Box::new(sink_device)),
        },
        Services {
            resolver: Arc::clone(&resolver) as Arc<dyn CommandResolver>,
            store: Arc::clone(&store) as Arc<dyn HistoryStore>,
            opener: Arc::clone(&opener) as Arc<dyn ResourceOpener>,
        },
        options,
    );

    Harness {
        handle,
        capture,
        sink,
        resolver,
        store,
        opener,
    }
}
