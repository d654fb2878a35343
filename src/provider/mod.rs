/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable sources of [`ManagementSnapshot`]s.
//!
//! The [management service](crate::management) pulls a fresh snapshot from its [`Provider`] on startup
//! and on every refresh tick. This crate ships two providers:
//! 1. [`DocumentProvider`](document::DocumentProvider): fetches an externally authored JSON document
//!    from a local path or an HTTP(S) URL, and derives a snapshot from the entry for the configured
//!    virtual chain. It re-derives everything on every call.
//! 2. [`MemoryProvider`](memory::MemoryProvider): holds a directly mutable snapshot, used to drive
//!    deterministic scenarios in tests and development tooling.
//!
//! Both providers satisfy the same contract: every term sequence in a returned snapshot holds at least
//! one term, and term sequences are returned in insertion order without reordering. Library users may
//! implement `Provider` for their own sources.

use std::fmt::{self, Display, Formatter};

use crate::types::{data_types::ReferenceTime, snapshot::ManagementSnapshot};

pub mod document;

pub mod memory;

pub mod retrieval;

use document::DocumentError;
use retrieval::RetrievalError;

/// A source of [`ManagementSnapshot`]s.
pub trait Provider: Send + Sync + 'static {
    /// Produce a complete snapshot.
    ///
    /// A `reference_time` of 0 asks for the current snapshot. Providers that page their history may
    /// use a non-zero `reference_time` to return the page that covers it; providers that do not may
    /// ignore it.
    fn get(&self, reference_time: ReferenceTime) -> Result<ManagementSnapshot, ProviderError>;
}

/// Ways that [`Provider::get`] can fail.
#[derive(Debug)]
pub enum ProviderError {
    /// See: [`RetrievalError`].
    Retrieval(RetrievalError),

    /// See: [`DocumentError`].
    Document(DocumentError),
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Retrieval(err) => write!(f, "retrieval failed: {}", err),
            ProviderError::Document(err) => write!(f, "document rejected: {}", err),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Retrieval(err) => Some(err),
            ProviderError::Document(err) => Some(err),
        }
    }
}

impl From<RetrievalError> for ProviderError {
    fn from(value: RetrievalError) -> Self {
        ProviderError::Retrieval(value)
    }
}

impl From<DocumentError> for ProviderError {
    fn from(value: DocumentError) -> Self {
        ProviderError::Document(value)
    }
}
