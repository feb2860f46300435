//! Session driver
//!
//! One tokio task owns the [`TurnMachine`] and is the only place its state
//! changes. Capture events, sink events, timer expiries, resolver results and
//! handle requests all arrive on channels and are processed one at a time;
//! the effects the machine returns are executed here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::actions::ResourceOpener;
use crate::history::{HistoryLog, HistoryStore};
use crate::profile::UserProfile;
use crate::resolver::{Command, CommandResolver, UserContext};
use crate::transcript::Turn;
use crate::voice::{
    Capability, CaptureControl, CaptureEvent, CaptureSource, Effect, Input, SinkEvent,
    SpeechOutput, SpeechSink, Timings, TurnMachine, TurnState,
};
use crate::{Error, Result};

/// Why a session is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    /// User logged out; the store's `logout` is called
    Logout,
    /// The surface hosting the session went away
    NavigatedAway,
    /// The authenticated session ended elsewhere
    AuthLost,
}

impl std::fmt::Display for DetachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logout => write!(f, "logout"),
            Self::NavigatedAway => write!(f, "navigated away"),
            Self::AuthLost => write!(f, "auth lost"),
        }
    }
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Machine delays
    pub timings: Timings,
    /// Locale for speech output
    pub output_locale: String,
    /// Speak the greeting on attach
    pub greeting: bool,
    /// Give up on the resolver after this long
    pub resolver_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timings: Timings::default(),
            output_locale: "hi-IN".to_string(),
            greeting: true,
            resolver_timeout: None,
        }
    }
}

/// Speech capabilities handed to a session
pub struct Devices {
    /// Speech-to-text source
    pub capture: Capability<Box<dyn CaptureSource>>,
    /// Text-to-speech sink
    pub sink: Capability<Box<dyn SpeechSink>>,
}

impl Devices {
    /// No speech at all: typed input, text replies
    #[must_use]
    pub fn none() -> Self {
        Self {
            capture: Capability::Unavailable("no capture source".to_string()),
            sink: Capability::Unavailable("no speech sink".to_string()),
        }
    }
}

/// Remote and platform services a session calls
#[derive(Clone)]
pub struct Services {
    /// Command resolution
    pub resolver: Arc<dyn CommandResolver>,
    /// History and logout
    pub store: Arc<dyn HistoryStore>,
    /// Resource opening
    pub opener: Arc<dyn ResourceOpener>,
}

/// Published view of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Turn-taking state
    pub state: TurnState,
    /// Listening indicator
    pub listening: bool,
    /// Speaking indicator
    pub speaking: bool,
    /// Whether voice capture is still usable
    pub capture_enabled: bool,
    /// Conversation so far
    pub transcript: Arc<[Turn]>,
    /// Query history
    pub history: Arc<[String]>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Request {
    Submit {
        text: String,
        reply: Reply<Command>,
    },
    DeleteHistory {
        index: usize,
        reply: Reply<String>,
    },
    Detach {
        reason: DetachReason,
        reply: Reply<()>,
    },
}

/// Cloneable handle to a running session
///
/// Dropping every handle detaches the session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    requests: mpsc::UnboundedSender<Request>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Session id (also carried by the session's tracing span)
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Submit typed text and wait for the turn's command
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput`, `TurnInFlight` or `Detached` when the
    /// submission is refused, and `Resolver` when resolution failed (the
    /// fallback reply is still spoken).
    pub async fn submit(&self, text: impl Into<String>) -> Result<Command> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Submit {
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| Error::Detached)?
    }

    /// Delete the history entry at `index`
    ///
    /// # Errors
    ///
    /// Returns `HistoryIndex` if out of range, `Detached` after teardown
    pub async fn delete_history(&self, index: usize) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::DeleteHistory { index, reply })?;
        rx.await.map_err(|_| Error::Detached)?
    }

    /// Tear the session down
    ///
    /// # Errors
    ///
    /// Returns `Detached` if already torn down, or the store's error when
    /// logging out fails (the session is detached regardless)
    pub async fn detach(&self, reason: DetachReason) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Detach { reason, reply })?;
        rx.await.map_err(|_| Error::Detached)?
    }

    /// Log out and tear the session down
    ///
    /// # Errors
    ///
    /// See [`SessionHandle::detach`]
    pub async fn logout(&self) -> Result<()> {
        self.detach(DetachReason::Logout).await
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots as they change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until the session reaches `state`
    ///
    /// # Errors
    ///
    /// Returns `Detached` if the session ends before reaching it
    pub async fn wait_for_state(&self, state: TurnState) -> Result<Snapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| Error::Detached)?;
        Ok(snapshot.clone())
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests.send(request).map_err(|_| Error::Detached)
    }
}

/// Attach a session for `profile` and start driving it
///
/// Must be called inside a tokio runtime.
#[must_use]
pub fn spawn(
    profile: &UserProfile,
    devices: Devices,
    services: Services,
    options: SessionOptions,
) -> SessionHandle {
    let id = Uuid::new_v4();

    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::unbounded_channel();

    let capture = CaptureControl::new(devices.capture, capture_tx);
    let output = SpeechOutput::new(devices.sink, options.output_locale.clone(), sink_tx);
    let wake = profile.wake_phrase();
    tracing::info!(
        session = %id,
        capture = capture.is_available(),
        wake_phrase = wake.is_enabled(),
        speech = output.is_available(),
        locale = output.locale(),
        "session devices"
    );
    let machine = TurnMachine::new(wake, options.timings, capture.is_available());
    let history = HistoryLog::new(profile.history.clone());

    let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_of(&machine, &history));

    let driver = Driver {
        machine,
        history,
        capture,
        output,
        services,
        context: profile.context(),
        resolver_timeout: options.resolver_timeout,
        timers: JoinSet::new(),
        internal: internal_tx,
        pending_reply: None,
        snapshots: snapshot_tx,
    };

    let greeting = options.greeting.then(|| profile.greeting());
    let channels = Channels {
        capture: capture_rx,
        sink: sink_rx,
        internal: internal_rx,
        requests: request_rx,
    };

    let span = tracing::info_span!("session", id = %id);
    tokio::spawn(driver.run(greeting, channels).instrument(span));

    SessionHandle {
        id,
        requests: request_tx,
        snapshots: snapshot_rx,
    }
}

struct Channels {
    capture: mpsc::UnboundedReceiver<CaptureEvent>,
    sink: mpsc::UnboundedReceiver<SinkEvent>,
    internal: mpsc::UnboundedReceiver<Input>,
    requests: mpsc::UnboundedReceiver<Request>,
}

struct Driver {
    machine: TurnMachine,
    history: HistoryLog,
    capture: CaptureControl,
    output: SpeechOutput,
    services: Services,
    context: UserContext,
    resolver_timeout: Option<Duration>,
    timers: JoinSet<Input>,
    internal: mpsc::UnboundedSender<Input>,
    pending_reply: Option<(u64, Reply<Command>)>,
    snapshots: watch::Sender<Snapshot>,
}

impl Driver {
    async fn run(mut self, greeting: Option<crate::voice::Greeting>, mut ch: Channels) {
        let effects = self.machine.attach(greeting);
        self.execute(effects);
        self.publish();

        loop {
            tokio::select! {
                request = ch.requests.recv() => {
                    let Some(request) = request else {
                        tracing::debug!("all handles dropped");
                        self.teardown(DetachReason::NavigatedAway).await;
                        break;
                    };
                    if self.on_request(request).await {
                        break;
                    }
                }
                Some(event) = ch.capture.recv() => {
                    self.feed(Input::Capture(event));
                }
                Some(SinkEvent::Ended { id }) = ch.sink.recv() => {
                    self.feed(Input::SpeechEnded { id });
                }
                Some(input) = ch.internal.recv() => {
                    self.feed(input);
                }
                Some(joined) = self.timers.join_next(), if !self.timers.is_empty() => {
                    match joined {
                        Ok(input) => self.feed(input),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => tracing::error!(error = %e, "timer task failed"),
                    }
                }
            }
        }

        tracing::info!("session ended");
    }

    /// Returns true once the session is torn down
    async fn on_request(&mut self, request: Request) -> bool {
        match request {
            Request::Submit { text, reply } => {
                match self.machine.submit(&text) {
                    Ok(effects) => {
                        let generation = effects.iter().find_map(|e| match e {
                            Effect::Resolve { generation, .. } => Some(*generation),
                            _ => None,
                        });
                        if let Some(generation) = generation {
                            self.pending_reply = Some((generation, reply));
                        }
                        self.execute(effects);
                        self.publish();
                    }
                    Err(rejection) => {
                        let _ = reply.send(Err(rejection.into()));
                    }
                }
                false
            }
            Request::DeleteHistory { index, reply } => {
                let result = self.history.remove(index);
                if let Ok(removed) = &result {
                    tracing::info!(index, entry = %removed, "history entry deleted");
                    self.persist_history();
                    self.publish();
                }
                let _ = reply.send(result);
                false
            }
            Request::Detach { reason, reply } => {
                let result = self.teardown(reason).await;
                let _ = reply.send(result);
                true
            }
        }
    }

    async fn teardown(&mut self, reason: DetachReason) -> Result<()> {
        tracing::info!(reason = %reason, "detaching");

        let effects = self.machine.detach();
        self.execute(effects);

        if let Some((_, reply)) = self.pending_reply.take() {
            let _ = reply.send(Err(Error::Detached));
        }
        self.publish();

        if reason != DetachReason::Logout {
            return Ok(());
        }

        self.services.store.logout().await.inspect_err(|e| {
            tracing::warn!(error = %e, "logout request failed");
        })
    }

    fn feed(&mut self, input: Input) {
        let reply = match &input {
            Input::Resolved {
                generation,
                outcome,
            } => self.take_reply(*generation, outcome),
            _ => None,
        };

        let effects = self.machine.handle(input);
        self.execute(effects);
        self.publish();

        // answered after the machine settled the turn
        if let Some((reply, result)) = reply {
            let _ = reply.send(result);
        }
    }

    fn take_reply(
        &mut self,
        generation: u64,
        outcome: &std::result::Result<Command, String>,
    ) -> Option<(Reply<Command>, Result<Command>)> {
        if self
            .pending_reply
            .as_ref()
            .is_none_or(|(pending, _)| *pending != generation)
        {
            return None;
        }

        let (_, reply) = self.pending_reply.take()?;
        Some((reply, outcome.clone().map_err(Error::Resolver)))
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            tracing::trace!(?effect, "effect");
            match effect {
                Effect::StartCapture => self.capture.start(),
                Effect::StopCapture => self.capture.stop(),
                Effect::Resolve { generation, query } => self.resolve(generation, query),
                Effect::Speak { id, text } => self.output.speak(id, &text),
                Effect::CancelSpeech => self.output.cancel(),
                Effect::Open(locator) => {
                    let opener = Arc::clone(&self.services.opener);
                    tokio::spawn(
                        async move {
                            if let Err(e) = opener.open(&locator).await {
                                tracing::warn!(error = %e, url = %locator, "failed to open resource");
                            }
                        }
                        .in_current_span(),
                    );
                }
                Effect::Schedule {
                    timer,
                    delay,
                    generation,
                } => {
                    self.timers.spawn(async move {
                        tokio::time::sleep(delay).await;
                        Input::TimerFired { timer, generation }
                    });
                }
                Effect::CancelTimers => self.timers.abort_all(),
                Effect::RecordQuery(query) => {
                    self.history.append(query.clone());
                    let store = Arc::clone(&self.services.store);
                    tokio::spawn(
                        async move {
                            if let Err(e) = store.append_history(&query).await {
                                tracing::warn!(error = %e, "failed to persist history entry");
                            }
                        }
                        .in_current_span(),
                    );
                }
            }
        }
    }

    fn resolve(&self, generation: u64, query: String) {
        let resolver = Arc::clone(&self.services.resolver);
        let context = self.context.clone();
        let timeout = self.resolver_timeout;
        let results = self.internal.clone();

        tokio::spawn(
            async move {
                let call = resolver.resolve(&query, &context);
                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, call).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Resolver(format!("timed out after {limit:?}"))),
                    },
                    None => call.await,
                };

                // send fails only once the session is gone
                let _ = results.send(Input::Resolved {
                    generation,
                    outcome: outcome.map_err(|e| match e {
                        Error::Resolver(reason) => reason,
                        other => other.to_string(),
                    }),
                });
            }
            .in_current_span(),
        );
    }

    fn persist_history(&self) {
        let store = Arc::clone(&self.services.store);
        let entries = self.history.entries().to_vec();
        tokio::spawn(
            async move {
                if let Err(e) = store.replace_history(&entries).await {
                    tracing::warn!(error = %e, "failed to persist history");
                }
            }
            .in_current_span(),
        );
    }

    /// Patch the published snapshot in place; lists are rebuilt only on change
    fn publish(&self) {
        let machine = &self.machine;
        let history = self.history.entries();
        self.snapshots.send_if_modified(|current| {
            let mut changed = set(&mut current.state, machine.state());
            changed |= set(&mut current.listening, machine.is_listening());
            changed |= set(&mut current.speaking, machine.is_speaking());
            changed |= set(&mut current.capture_enabled, machine.capture_enabled());

            let turns = machine.transcript().turns();
            if *current.transcript != *turns {
                current.transcript = Arc::from(turns);
                changed = true;
            }
            if *current.history != *history {
                current.history = Arc::from(history);
                changed = true;
            }
            changed
        });
    }
}

fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn snapshot_of(machine: &TurnMachine, history: &HistoryLog) -> Snapshot {
    Snapshot {
        state: machine.state(),
        listening: machine.is_listening(),
        speaking: machine.is_speaking(),
        capture_enabled: machine.capture_enabled(),
        transcript: Arc::from(machine.transcript().turns()),
        history: Arc::from(history.entries()),
    }
}
