//! # MH Test Utilities
//!
//! Shared test utilities for the Media Handler (MH).
//!
//! This crate provides mock worker channels and consumer fixtures for
//! isolated consumer testing without a worker process.
//!
//! ## Modules
//!
//! - `mock_channel` - Scriptable control channel and payload channel mocks
//! - `fixtures` - Consumer builder, harness and event recording helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mh_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestConsumer::new().build();
//!     let mut observer = harness.observe();
//!
//!     harness.consumer.pause().await.unwrap();
//!
//!     assert_eq!(drain(&mut observer), vec![ObserverEvent::Pause]);
//!     assert_eq!(harness.channel.request_count(Method::ConsumerPause), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_channel;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_channel::*;
