//! Object-storage module with AWS SigV4 signing
//!
//! This module provides:
//! - Temporary credential cache with single-flight refresh
//! - AWS Signature Version 4 signing as pure functions
//! - Object PUT/GET through the transport's storage path

pub mod client;
pub mod credentials;
pub mod signer;

// Re-export main types for convenience
pub use client::StorageClient;
pub use credentials::{AckEndpoint, CredentialCache, CredentialSource, StorageCredentials};
pub use signer::{sign, SignedRequest};
