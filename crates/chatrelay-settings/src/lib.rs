//! # chatrelay-settings
//!
//! Configuration for the relay, loaded from four layers (lowest priority
//! first):
//!
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: an optional JSON file, deep-merged over defaults
//! 3. **`.env` file**: loaded into the process environment if present
//! 4. **Environment variables**: `PORT`, `GROQ_API_KEY`, `RELAY_*` overrides
//!
//! The API credential is only ever read from the environment and is held as
//! a [`secrecy::SecretString`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides_from, deep_merge, load_settings};
pub use types::*;
