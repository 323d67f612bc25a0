//! # chatrelay-core
//!
//! Domain types shared by every relay crate.
//!
//! - [`Message`]: the validated, immutable unit of chat traffic
//! - [`codec`]: JSON wire encoding and validating decoding
//! - [`ConnectionId`]: opaque identity of one peer connection

#![deny(unsafe_code)]

pub mod codec;
pub mod ids;
pub mod message;

pub use codec::{CodecError, decode, encode};
pub use ids::ConnectionId;
pub use message::{APOLOGY, Message, MessageType, SENDER_AI, SENDER_SYSTEM, SENDER_USER, ValidationError};
