//! Wire-level types shared by every transport
//!
//! `topics` implements the topic/routing-key grammar: building wildcarded
//! subscription patterns from handler filters and tokenizing inbound
//! topics into structured events. `messages` holds the event and downlink
//! payload types.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
