//! MQTT topic handling
//!
//! Provides ACL pattern matching against MQTT topic names.

mod topic;

pub use topic::{TopicMatcher, CLIENT_ID_PLACEHOLDER, USERNAME_PLACEHOLDER};
