//! Test support utilities
//!
//! Mock implementations that let application and SDK tests exercise the
//! dispatch and credential machinery without a broker or token endpoint.

pub mod mocks;

pub use mocks::{MockCredentialSource, MockTransport};
