//! Wire protocol spoken with the media worker.
//!
//! The worker is driven through two channels: a request/response control
//! channel carrying JSON bodies, and a payload channel carrying raw media
//! alongside a small JSON header. This crate holds the payload shapes for
//! consumer resources, the dotted method names, and the decoders that turn
//! unsolicited worker notifications into typed values.

#![warn(clippy::pedantic)]

pub mod consumer;
pub mod method;
pub mod notification;
pub mod rtp;

pub use method::{Internal, Method};
