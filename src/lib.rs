//! Veda - voice assistant controller
//!
//! This library provides the core of the Veda assistant:
//! - Turn-taking between speech capture, speech output and typed input
//! - Wake phrase matching on recognized text
//! - Command resolution and action dispatch
//! - Transcript and query history
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Front end                         │
//! │   Capture source  │  Speech sink  │  Typed input     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ events / SessionHandle
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Session driver                       │
//! │   TurnMachine  │  Timers  │  Transcript  │  History  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Backend + platform                   │
//! │   Resolver  │  History store  │  Resource opener     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod backend;
pub mod config;
pub mod console;
pub mod error;
pub mod history;
pub mod profile;
pub mod resolver;
pub mod session;
pub mod transcript;
pub mod voice;

pub use actions::{ResourceLocator, ResourceOpener, dispatch};
pub use backend::HttpBackend;
pub use config::Config;
pub use error::{Error, Result};
pub use history::{HistoryLog, HistoryStore};
pub use profile::UserProfile;
pub use resolver::{Command, CommandResolver, UserContext};
pub use session::{DetachReason, SessionHandle, Snapshot};
pub use transcript::{Sender, Transcript, Turn};
