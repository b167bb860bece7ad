//! Core components for the blobway storage facade.
//!
//! This crate provides the foundational types shared by every blobway
//! service crate:
//!
//! - **Context**: a container holding the injected HTTP transport
//! - **Error**: the error taxonomy the facade propagates
//! - **hash/time**: signing helpers (HMAC, base64, wire date formats)
//!
//! The crate defines no default transport. Users configure a real
//! [`HttpSend`] implementation (for example `blobway-http-send-reqwest`);
//! an unconfigured context uses a no-op transport that fails every call.

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::Context;
pub use context::HttpSend;
pub use context::NoopHttpSend;

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
