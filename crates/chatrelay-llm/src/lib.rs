//! # chatrelay-llm
//!
//! Provider abstractions for the relay's two external services:
//!
//! - [`CompletionProvider`]: turns one user message into one assistant reply
//!   ([`GroqChatClient`] against an OpenAI-compatible chat endpoint).
//! - [`TranscriptionProvider`]: turns uploaded audio into text
//!   ([`GroqWhisperClient`]).
//!
//! [`mock`] holds scripted implementations for tests.

#![deny(unsafe_code)]

pub mod groq;
pub mod mock;
pub mod provider;
pub mod whisper;

pub use groq::{GroqChatClient, GroqChatConfig};
pub use provider::{CompletionError, CompletionProvider, TranscriptionError, TranscriptionProvider};
pub use whisper::{GroqWhisperClient, WhisperConfig};
