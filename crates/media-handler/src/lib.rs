//! Media Handler (MH) Library
//!
//! Client-side handles for resources living in the media worker process.
//! The worker owns the media plane; this library keeps a consistent local
//! view of each resource and turns worker notifications into typed events.
//!
//! # Architecture
//!
//! ```text
//! Transport (owner)
//! └── Consumer (one per forwarded producer)
//!     ├── ControlChannel  - requests + JSON notifications
//!     ├── PayloadChannel  - binary notifications (rtp)
//!     ├── ConsumerEvents  - typed listener slots
//!     ├── OwnerSignals    - @close / @producerclose for the owner
//!     └── Observer        - bounded broadcast bus
//! ```
//!
//! # Key Design Decisions
//!
//! - **One lock per consumer**: every state transition is decided and applied
//!   in one critical section; listeners run after the lock is released
//! - **Exactly-once close**: explicit close, producer close and transport close
//!   race through the same guard
//! - **Confirmed mutations**: local calls change state only once the worker
//!   answered successfully
//!
//! # Modules
//!
//! - [`channel`] - Control and payload channel seams
//! - [`config`] - Configuration from environment
//! - [`consumer`] - The consumer handle
//! - [`errors`] - Error types
//! - [`events`] - Listener slots and the observer bus
//! - [`observability`] - Tracing and metrics setup

#![warn(clippy::pedantic)]

pub mod channel;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod events;
pub mod observability;

pub use channel::{ControlChannel, NotificationHandler, PayloadChannel, PayloadHandler};
pub use config::{Config, ConfigError, ConsumerSettings};
pub use consumer::{
    AppData, CloseReason, Consumer, ConsumerIdentity, ConsumerParams, NegotiatedParameters,
};
pub use errors::{ChannelError, MhError};
pub use events::{ConsumerEvents, HandlerSlot, Observer, ObserverEvent, OwnerSignals};
