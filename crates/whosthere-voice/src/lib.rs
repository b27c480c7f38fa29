//! Voice collaborators for the whosthere intercom.
//!
//! The orchestrator talks to three external systems through narrow traits:
//!
//! - [`SpeechSynthesizer`] speaks one of the fixed [`PhraseKey`]s on a device.
//! - [`DoorbellTransport`] records a bounded clip from the device microphone
//!   and plays audio on its speaker.
//! - [`Transcriber`] turns a recorded clip into text.
//!
//! This crate defines those traits and ships the adapters a deployment
//! needs: pre-rendered phrase clips played through the transport, a
//! whisper.cpp-compatible subprocess transcriber, a fixed transcriber and a
//! simulated intercom for development, and scripted doubles in [`fake`] for
//! tests.
//!
//! Timeouts around collaborator calls are the caller's job; adapters only
//! bound their own resource use (input sizes, subprocess runtime).

mod collaborator;
mod error;
pub mod fake;
mod intercom;
mod stt;
mod tts;

pub use collaborator::{AudioHandle, DoorbellTransport, SpeechSynthesizer, Transcriber, Transcript};
pub use error::VoiceError;
pub use intercom::SimulatedIntercom;
pub use stt::{FixedTranscriber, WhisperTranscriber};
pub use tts::{clip_candidates, PrerenderedSpeech};
pub use whosthere_types::PhraseKey;
