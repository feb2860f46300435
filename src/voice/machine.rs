//! Turn-taking state machine
//!
//! Decides when capture may run, when a turn starts, and when speech may
//! play. The machine does no I/O: every input returns the [`Effect`]s the
//! session driver must carry out.
//!
//! ```text
//!  Idle ──startup──▶ Listening ──wake/typed──▶ Processing ──settled──▶ Speaking
//!                        ▲                                               │
//!                        └────────────────── cool-down ◀── speech end ───┘
//!
//!  any ──detach──▶ Detached
//! ```
//!
//! Timers, resolver results and speech completions carry the generation
//! that was current when they were requested. The generation moves on every
//! turn start, every utterance and on detach, so stale callbacks are dropped.

use std::time::Duration;

use crate::actions::{self, ResourceLocator};
use crate::resolver::Command;
use crate::transcript::Transcript;

use super::capture::CaptureEvent;
use super::wake_word::WakePhrase;

/// Assistant reply when resolution fails
pub const FALLBACK_RESPONSE: &str = "SYSTEM_ERROR: REQUEST_FAILED";

/// Turn-taking state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Attached, waiting for the startup delay
    Idle,
    /// Waiting for a wake phrase or typed input
    Listening,
    /// Resolver call in flight
    Processing,
    /// Reply is playing (or cooling down before capture resumes)
    Speaking,
    /// Session torn down
    Detached,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Speaking => write!(f, "speaking"),
            Self::Detached => write!(f, "detached"),
        }
    }
}

/// Timers the machine schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Lets the capture capability initialize after attach
    Startup,
    /// Restarts capture after it stopped on its own
    Restart,
    /// Pause between speech end and capture resuming
    Cooldown,
}

/// Delays used by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay before the first capture start
    pub startup: Duration,
    /// Delay before restarting capture that stopped on its own
    pub restart: Duration,
    /// Delay after speech end before capture resumes
    pub cooldown: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            startup: Duration::from_millis(1000),
            restart: Duration::from_millis(1000),
            cooldown: Duration::from_millis(800),
        }
    }
}

/// Greeting played when the session attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Appended to the transcript
    pub display: String,
    /// Spoken aloud
    pub spoken: String,
}

/// Event delivered to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Capture source event
    Capture(CaptureEvent),
    /// Resolver settled for the turn started at `generation`
    Resolved {
        /// Generation of the turn
        generation: u64,
        /// Command or failure description
        outcome: std::result::Result<Command, String>,
    },
    /// Speech sink finished the utterance `id`
    SpeechEnded {
        /// Utterance id (a generation)
        id: u64,
    },
    /// A timer fired
    TimerFired {
        /// Which timer
        timer: Timer,
        /// Generation it was scheduled in
        generation: u64,
    },
}

/// Work the driver must perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the capture source to start
    StartCapture,
    /// Ask the capture source to stop
    StopCapture,
    /// Call the resolver; report back with `Input::Resolved`
    Resolve {
        /// Generation of the turn
        generation: u64,
        /// Query text
        query: String,
    },
    /// Speak text; report back with `Input::SpeechEnded`
    Speak {
        /// Utterance id
        id: u64,
        /// Text to speak
        text: String,
    },
    /// Cancel any utterance
    CancelSpeech,
    /// Open a resource (fire-and-forget)
    Open(ResourceLocator),
    /// Fire `timer` after `delay`
    Schedule {
        /// Which timer
        timer: Timer,
        /// Delay
        delay: Duration,
        /// Generation to report back
        generation: u64,
    },
    /// Drop every pending timer
    CancelTimers,
    /// Record a submitted query in the history
    RecordQuery(String),
}

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Empty after trimming
    Empty,
    /// A turn is already being resolved
    InFlight,
    /// Session torn down
    Detached,
}

impl From<Rejection> for crate::Error {
    fn from(r: Rejection) -> Self {
        match r {
            Rejection::Empty => Self::EmptyInput,
            Rejection::InFlight => Self::TurnInFlight,
            Rejection::Detached => Self::Detached,
        }
    }
}

/// The turn-taking state machine
#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
    generation: u64,
    is_recognizing: bool,
    is_speaking: bool,
    capture_enabled: bool,
    restart_pending: Option<u64>,
    wake: WakePhrase,
    timings: Timings,
    transcript: Transcript,
}

impl TurnMachine {
    /// Create a machine in `Idle`
    #[must_use]
    pub const fn new(wake: WakePhrase, timings: Timings, capture_available: bool) -> Self {
        Self {
            state: TurnState::Idle,
            generation: 0,
            is_recognizing: false,
            is_speaking: false,
            capture_enabled: capture_available,
            restart_pending: None,
            wake,
            timings,
            transcript: Transcript::new(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Current generation
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the capture source is believed to be running
    #[must_use]
    pub const fn is_recognizing(&self) -> bool {
        self.is_recognizing
    }

    /// Whether an utterance is playing
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Published listening indicator
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.is_recognizing
    }

    /// Whether capture can still be used in this session
    #[must_use]
    pub const fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    /// Conversation so far
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Begin the session: optional greeting, then the startup timer
    pub fn attach(&mut self, greeting: Option<Greeting>) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(greeting) = greeting {
            self.transcript.push_assistant(greeting.display);
            self.begin_speech(greeting.spoken, &mut effects);
        }

        effects.push(self.schedule(Timer::Startup, self.timings.startup));
        tracing::info!(capture = self.capture_enabled, "session attached");
        effects
    }

    /// Submit typed text
    ///
    /// # Errors
    ///
    /// Rejects empty text, a second submission while a turn is being
    /// resolved, and any submission after detach.
    pub fn submit(&mut self, text: &str) -> std::result::Result<Vec<Effect>, Rejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Rejection::Empty);
        }

        match self.state {
            TurnState::Detached => Err(Rejection::Detached),
            TurnState::Processing => {
                tracing::debug!("submission rejected, turn in flight");
                Err(Rejection::InFlight)
            }
            TurnState::Idle | TurnState::Listening | TurnState::Speaking => {
                Ok(self.begin_turn(text.to_string()))
            }
        }
    }

    /// Tear the session down; safe to call in any state, more than once
    pub fn detach(&mut self) -> Vec<Effect> {
        if self.state == TurnState::Detached {
            return Vec::new();
        }

        tracing::info!(from = %self.state, "session detached");
        self.state = TurnState::Detached;
        self.generation += 1;
        self.is_recognizing = false;
        self.is_speaking = false;
        self.restart_pending = None;

        vec![Effect::CancelTimers, Effect::StopCapture, Effect::CancelSpeech]
    }

    /// Feed an event
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.state == TurnState::Detached {
            tracing::trace!(?input, "event after detach ignored");
            return Vec::new();
        }

        match input {
            Input::Capture(event) => self.on_capture(event),
            Input::Resolved {
                generation,
                outcome,
            } => self.on_resolved(generation, outcome),
            Input::SpeechEnded { id } => self.on_speech_ended(id),
            Input::TimerFired { timer, generation } => self.on_timer(timer, generation),
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) -> Vec<Effect> {
        match event {
            CaptureEvent::Started => {
                if self.state == TurnState::Listening && !self.is_speaking {
                    self.is_recognizing = true;
                    tracing::debug!("capture started");
                    Vec::new()
                } else {
                    // start raced with a turn; capture may not run now
                    tracing::debug!(state = %self.state, "late capture start, stopping");
                    self.is_recognizing = false;
                    vec![Effect::StopCapture]
                }
            }
            CaptureEvent::Result {
                transcript,
                is_final,
            } => self.on_transcript(&transcript, is_final),
            CaptureEvent::Ended => {
                self.is_recognizing = false;
                tracing::debug!(state = %self.state, "capture ended");
                self.maybe_restart()
            }
            CaptureEvent::Errored(code) => {
                self.is_recognizing = false;
                tracing::warn!(code = %code, state = %self.state, "capture error");

                if code.is_permission_denied() {
                    tracing::warn!("capture permission denied, typed input only");
                    self.capture_enabled = false;
                    return Vec::new();
                }
                if !code.is_retryable() {
                    // the end event that follows schedules the restart
                    return Vec::new();
                }
                self.maybe_restart()
            }
        }
    }

    fn on_transcript(&mut self, transcript: &str, is_final: bool) -> Vec<Effect> {
        if !is_final {
            return Vec::new();
        }
        if self.state != TurnState::Listening || self.is_speaking {
            tracing::debug!(state = %self.state, "transcript outside listening ignored");
            return Vec::new();
        }

        let transcript = transcript.trim();
        tracing::debug!(transcript, "recognized");

        if transcript.is_empty() || !self.wake.matches(transcript) {
            return Vec::new();
        }

        tracing::info!(transcript, "wake phrase detected");
        self.begin_turn(transcript.to_string())
    }

    fn on_resolved(
        &mut self,
        generation: u64,
        outcome: std::result::Result<Command, String>,
    ) -> Vec<Effect> {
        if generation != self.generation || self.state != TurnState::Processing {
            tracing::debug!(generation, current = self.generation, "stale resolution dropped");
            return Vec::new();
        }

        let mut effects = Vec::new();
        match outcome {
            Ok(command) => {
                tracing::info!(kind = %command.kind, "command resolved");
                self.transcript.push_assistant(command.response.clone());
                self.begin_speech(command.response, &mut effects);
                if let Some(locator) = actions::dispatch(&command.kind, &command.user_input) {
                    effects.push(Effect::Open(locator));
                }
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "command resolution failed");
                self.transcript.push_assistant(FALLBACK_RESPONSE);
                self.begin_speech(FALLBACK_RESPONSE.to_string(), &mut effects);
            }
        }
        effects
    }

    fn on_speech_ended(&mut self, id: u64) -> Vec<Effect> {
        if id != self.generation || !self.is_speaking {
            tracing::trace!(id, current = self.generation, "stale speech end dropped");
            return Vec::new();
        }

        self.is_speaking = false;
        tracing::debug!(id, "speech ended");
        vec![self.schedule(Timer::Cooldown, self.timings.cooldown)]
    }

    fn on_timer(&mut self, timer: Timer, generation: u64) -> Vec<Effect> {
        if timer == Timer::Restart && self.restart_pending == Some(generation) {
            self.restart_pending = None;
        }
        if generation != self.generation {
            tracing::trace!(?timer, generation, "stale timer dropped");
            return Vec::new();
        }

        match timer {
            Timer::Startup => {
                if self.state != TurnState::Idle || self.is_speaking {
                    return Vec::new();
                }
                self.enter_listening()
            }
            Timer::Cooldown => {
                if !matches!(self.state, TurnState::Speaking | TurnState::Idle) || self.is_speaking
                {
                    return Vec::new();
                }
                self.enter_listening()
            }
            Timer::Restart => {
                if self.state != TurnState::Listening || self.is_speaking || self.is_recognizing {
                    return Vec::new();
                }
                self.start_capture()
            }
        }
    }

    fn begin_turn(&mut self, text: String) -> Vec<Effect> {
        let mut effects = vec![Effect::StopCapture];
        self.is_recognizing = false;

        if self.is_speaking {
            effects.push(Effect::CancelSpeech);
            self.is_speaking = false;
        }

        self.transcript.push_user(text.clone());
        effects.push(Effect::RecordQuery(text.clone()));

        self.generation += 1;
        self.state = TurnState::Processing;
        self.restart_pending = None;
        tracing::info!(generation = self.generation, "turn started");

        effects.push(Effect::Resolve {
            generation: self.generation,
            query: text,
        });
        effects
    }

    fn begin_speech(&mut self, text: String, effects: &mut Vec<Effect>) {
        if self.is_recognizing {
            effects.push(Effect::StopCapture);
            self.is_recognizing = false;
        }

        self.generation += 1;
        self.is_speaking = true;
        if self.state != TurnState::Idle {
            self.state = TurnState::Speaking;
        }

        effects.push(Effect::Speak {
            id: self.generation,
            text,
        });
    }

    fn enter_listening(&mut self) -> Vec<Effect> {
        self.state = TurnState::Listening;
        tracing::debug!(capture = self.capture_enabled, "listening");
        self.start_capture()
    }

    fn start_capture(&mut self) -> Vec<Effect> {
        if !self.capture_enabled || self.is_recognizing || self.is_speaking {
            return Vec::new();
        }
        vec![Effect::StartCapture]
    }

    fn maybe_restart(&mut self) -> Vec<Effect> {
        if self.state != TurnState::Listening
            || self.is_speaking
            || !self.capture_enabled
            || self.restart_pending == Some(self.generation)
        {
            return Vec::new();
        }

        self.restart_pending = Some(self.generation);
        vec![self.schedule(Timer::Restart, self.timings.restart)]
    }

    const fn schedule(&self, timer: Timer, delay: Duration) -> Effect {
        Effect::Schedule {
            timer,
            delay,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Sender;
    use crate::voice::CaptureErrorCode;

    fn machine() -> TurnMachine {
        TurnMachine::new(WakePhrase::new(Some("Veda")), Timings::default(), true)
    }

    /// Attach without greeting and fire the startup timer
    fn listening() -> TurnMachine {
        let mut m = machine();
        let effects = m.attach(None);
        let generation = scheduled(&effects, Timer::Startup).unwrap();
        let effects = m.handle(Input::TimerFired {
            timer: Timer::Startup,
            generation,
        });
        assert_eq!(effects, [Effect::StartCapture]);
        m.handle(Input::Capture(CaptureEvent::Started));
        assert!(m.is_recognizing());
        m
    }

    fn scheduled(effects: &[Effect], wanted: Timer) -> Option<u64> {
        effects.iter().find_map(|e| match e {
            Effect::Schedule {
                timer, generation, ..
            } if *timer == wanted => Some(*generation),
            _ => None,
        })
    }

    fn resolve_generation(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Resolve { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("turn should request resolution")
    }

    fn speak_id(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Speak { id, .. } => Some(*id),
                _ => None,
            })
            .expect("should speak")
    }

    fn final_result(text: &str) -> Input {
        Input::Capture(CaptureEvent::Result {
            transcript: text.to_string(),
            is_final: true,
        })
    }

    #[test]
    fn test_attach_schedules_startup() {
        let mut m = machine();
        let effects = m.attach(None);
        assert_eq!(m.state(), TurnState::Idle);
        assert_eq!(
            effects,
            [Effect::Schedule {
                timer: Timer::Startup,
                delay: Duration::from_millis(1000),
                generation: 0,
            }]
        );
    }

    #[test]
    fn test_greeting_defers_capture_until_spoken() {
        let mut m = machine();
        let effects = m.attach(Some(Greeting {
            display: "online".to_string(),
            spoken: "ready".to_string(),
        }));
        let id = speak_id(&effects);
        let startup = scheduled(&effects, Timer::Startup).unwrap();

        assert!(m.is_speaking());
        assert_eq!(m.transcript().len(), 1);

        // startup while the greeting plays does nothing
        let effects = m.handle(Input::TimerFired {
            timer: Timer::Startup,
            generation: startup,
        });
        assert!(effects.is_empty());
        assert_eq!(m.state(), TurnState::Idle);

        let effects = m.handle(Input::SpeechEnded { id });
        let cooldown = scheduled(&effects, Timer::Cooldown).unwrap();
        let effects = m.handle(Input::TimerFired {
            timer: Timer::Cooldown,
            generation: cooldown,
        });
        assert_eq!(effects, [Effect::StartCapture]);
        assert_eq!(m.state(), TurnState::Listening);
    }

    #[test]
    fn test_transcript_without_wake_phrase_is_ignored() {
        let mut m = listening();
        let effects = m.handle(final_result("what time is it"));
        assert!(effects.is_empty());
        assert_eq!(m.state(), TurnState::Listening);
        assert!(m.is_recognizing());
    }

    #[test]
    fn test_interim_results_are_ignored() {
        let mut m = listening();
        let effects = m.handle(Input::Capture(CaptureEvent::Result {
            transcript: "hey veda".to_string(),
            is_final: false,
        }));
        assert!(effects.is_empty());
        assert_eq!(m.state(), TurnState::Listening);
    }

    #[test]
    fn test_wake_phrase_starts_turn() {
        let mut m = listening();
        let effects = m.handle(final_result("  hey VEDA what time is it "));

        assert_eq!(effects[0], Effect::StopCapture);
        assert!(effects.contains(&Effect::RecordQuery("hey VEDA what time is it".to_string())));
        assert_eq!(m.state(), TurnState::Processing);
        assert!(!m.is_recognizing());
        assert_eq!(m.transcript().last().unwrap().sender, Sender::User);
    }

    #[test]
    fn test_full_turn_returns_to_listening() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("open youtube search for cats").unwrap());
        m.handle(Input::Capture(CaptureEvent::Ended));

        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("youtube-search", "cats", "Searching YouTube for cats")),
        });
        assert_eq!(m.state(), TurnState::Speaking);
        assert!(effects.contains(&Effect::Open(
            actions::dispatch("youtube-search", "cats").unwrap()
        )));

        let effects = m.handle(Input::SpeechEnded {
            id: speak_id(&effects),
        });
        assert_eq!(m.state(), TurnState::Speaking);
        let cooldown = scheduled(&effects, Timer::Cooldown).unwrap();

        let effects = m.handle(Input::TimerFired {
            timer: Timer::Cooldown,
            generation: cooldown,
        });
        assert_eq!(effects, [Effect::StartCapture]);
        assert_eq!(m.state(), TurnState::Listening);

        let texts: Vec<&str> = m.transcript().turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["open youtube search for cats", "Searching YouTube for cats"]);
    }

    #[test]
    fn test_failed_resolution_speaks_fallback() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("hello").unwrap());

        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Err("connection refused".to_string()),
        });

        assert!(effects.contains(&Effect::Speak {
            id: m.generation(),
            text: FALLBACK_RESPONSE.to_string(),
        }));
        assert_eq!(m.transcript().len(), 2);
        assert_eq!(m.transcript().last().unwrap().text, FALLBACK_RESPONSE);
        assert_eq!(m.state(), TurnState::Speaking);
    }

    #[test]
    fn test_unknown_command_type_opens_nothing() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("what time is it").unwrap());
        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("general", "", "It is noon")),
        });
        assert!(!effects.iter().any(|e| matches!(e, Effect::Open(_))));
    }

    #[test]
    fn test_submission_guards() {
        let mut m = listening();
        assert_eq!(m.submit("   ").unwrap_err(), Rejection::Empty);
        assert_eq!(m.state(), TurnState::Listening);

        m.submit("first").unwrap();
        assert_eq!(m.submit("second").unwrap_err(), Rejection::InFlight);
        assert_eq!(m.submit("third").unwrap_err(), Rejection::InFlight);
        assert_eq!(m.transcript().len(), 1);

        m.detach();
        assert_eq!(m.submit("late").unwrap_err(), Rejection::Detached);
    }

    #[test]
    fn test_wake_phrase_ignored_while_processing() {
        let mut m = listening();
        m.submit("first").unwrap();
        let effects = m.handle(final_result("veda again"));
        assert!(effects.is_empty());
        assert_eq!(m.transcript().len(), 1);
    }

    #[test]
    fn test_stale_resolution_is_dropped() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("first").unwrap());
        m.detach();

        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("general", "", "late")),
        });
        assert!(effects.is_empty());
        assert_eq!(m.transcript().len(), 1);
    }

    #[test]
    fn test_capture_end_while_listening_restarts() {
        let mut m = listening();
        let effects = m.handle(Input::Capture(CaptureEvent::Ended));
        let generation = scheduled(&effects, Timer::Restart).unwrap();
        assert!(!m.is_listening());

        // onerror followed by onend schedules only one restart
        let effects = m.handle(Input::Capture(CaptureEvent::Errored(CaptureErrorCode::NoSpeech)));
        assert!(effects.is_empty());

        let effects = m.handle(Input::TimerFired {
            timer: Timer::Restart,
            generation,
        });
        assert_eq!(effects, [Effect::StartCapture]);
    }

    #[test]
    fn test_capture_end_while_speaking_waits_for_speech() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("hello").unwrap());
        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("general", "", "hi")),
        });
        let id = speak_id(&effects);

        assert!(m.handle(Input::Capture(CaptureEvent::Ended)).is_empty());

        let effects = m.handle(Input::SpeechEnded { id });
        assert!(scheduled(&effects, Timer::Cooldown).is_some());
    }

    #[test]
    fn test_aborted_capture_restarts_on_end() {
        let mut m = listening();
        let effects = m.handle(Input::Capture(CaptureEvent::Errored(CaptureErrorCode::Aborted)));
        assert!(effects.is_empty());

        let effects = m.handle(Input::Capture(CaptureEvent::Ended));
        let generation = scheduled(&effects, Timer::Restart).unwrap();
        assert!(m.handle(Input::Capture(CaptureEvent::Ended)).is_empty());
        assert!(m.capture_enabled());

        let effects = m.handle(Input::TimerFired {
            timer: Timer::Restart,
            generation,
        });
        assert_eq!(effects, [Effect::StartCapture]);
    }

    #[test]
    fn test_permission_denied_degrades_to_typed_input() {
        let mut m = listening();
        m.handle(Input::Capture(CaptureEvent::Errored(CaptureErrorCode::NotAllowed)));
        assert!(!m.capture_enabled());
        assert!(m.handle(Input::Capture(CaptureEvent::Ended)).is_empty());

        let generation = resolve_generation(&m.submit("typed still works").unwrap());
        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("general", "", "yes")),
        });
        let effects = m.handle(Input::SpeechEnded {
            id: speak_id(&effects),
        });
        let cooldown = scheduled(&effects, Timer::Cooldown).unwrap();
        let effects = m.handle(Input::TimerFired {
            timer: Timer::Cooldown,
            generation: cooldown,
        });
        assert!(effects.is_empty());
        assert_eq!(m.state(), TurnState::Listening);
    }

    #[test]
    fn test_late_capture_start_is_stopped() {
        let mut m = listening();
        m.submit("hello").unwrap();
        let effects = m.handle(Input::Capture(CaptureEvent::Started));
        assert_eq!(effects, [Effect::StopCapture]);
        assert!(!m.is_recognizing());
    }

    #[test]
    fn test_typed_input_preempts_speech() {
        let mut m = listening();
        let generation = resolve_generation(&m.submit("one").unwrap());
        let effects = m.handle(Input::Resolved {
            generation,
            outcome: Ok(Command::new("general", "", "reply one")),
        });
        let old_id = speak_id(&effects);

        let effects = m.submit("two").unwrap();
        assert!(effects.contains(&Effect::CancelSpeech));
        assert!(!m.is_speaking());
        assert_eq!(m.state(), TurnState::Processing);

        // completion of the cancelled utterance must not resume capture
        assert!(m.handle(Input::SpeechEnded { id: old_id }).is_empty());
    }

    #[test]
    fn test_detach_is_idempotent() {
        let mut m = listening();
        let effects = m.detach();
        assert_eq!(
            effects,
            [Effect::CancelTimers, Effect::StopCapture, Effect::CancelSpeech]
        );
        assert!(m.detach().is_empty());
        assert!(m.handle(Input::Capture(CaptureEvent::Ended)).is_empty());
        assert_eq!(m.state(), TurnState::Detached);
    }

    #[test]
    fn test_mutual_exclusion_over_event_sequence() {
        let mut m = machine();
        let mut pending: Vec<Input> = Vec::new();
        let queue_effects = |effects: Vec<Effect>, pending: &mut Vec<Input>| {
            for effect in effects {
                match effect {
                    Effect::Schedule {
                        timer, generation, ..
                    } => pending.push(Input::TimerFired { timer, generation }),
                    Effect::Speak { id, .. } => pending.push(Input::SpeechEnded { id }),
                    Effect::StartCapture => pending.push(Input::Capture(CaptureEvent::Started)),
                    _ => {}
                }
            }
        };

        queue_effects(
            m.attach(Some(Greeting {
                display: "d".to_string(),
                spoken: "s".to_string(),
            })),
            &mut pending,
        );

        let noise = [
            final_result("veda open instagram"),
            Input::Capture(CaptureEvent::Ended),
            final_result("nothing here"),
            Input::Capture(CaptureEvent::Errored(CaptureErrorCode::Network)),
            Input::Capture(CaptureEvent::Started),
        ];

        for step in 0..60 {
            let input = if step % 3 == 0 {
                noise[step % noise.len()].clone()
            } else if let Some(next) = pending.pop() {
                next
            } else {
                noise[(step + 1) % noise.len()].clone()
            };

            let effects = m.handle(input);
            if let Some(generation) = effects.iter().find_map(|e| match e {
                Effect::Resolve { generation, .. } => Some(*generation),
                _ => None,
            }) {
                pending.push(Input::Resolved {
                    generation,
                    outcome: Ok(Command::new("instagram-open", "", "Opening Instagram")),
                });
            }
            queue_effects(effects, &mut pending);

            assert!(!(m.is_recognizing() && m.is_speaking()));
            if m.state() == TurnState::Listening {
                assert!(!m.is_speaking());
            }
            if matches!(m.state(), TurnState::Processing | TurnState::Speaking) {
                assert!(!m.is_recognizing());
            }
        }
    }
}
