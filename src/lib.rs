//! Fetchtap - client-side HTTP traffic recorder
//!
//! Wraps a replaceable network entry point, captures request metadata and
//! streamed response bodies without disturbing the caller, and keeps a
//! bounded store of records that can be inspected, summarized and exported.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod filter;
pub mod network;
pub mod record;
pub mod recording;
pub mod stats;
pub mod storage;

pub use error::{Result, TapError};
