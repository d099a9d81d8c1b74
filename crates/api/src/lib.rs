//! Async client for the DataMeta REST API.
//!
//! Wraps every endpoint the submission workflow needs: the
//! announce/transfer/confirm file handshake, metadata records, sample
//! sheet conversion, pre-submission validation, submissions, the pending
//! overview and the review table.

pub mod client;
pub mod error;
mod upload;

#[cfg(test)]
mod test_server;

pub use client::Client;
pub use error::ApiError;
