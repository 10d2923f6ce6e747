//! Request cache for rate-limited blockchain reads
//!
//! [`cache::RequestCache`] deduplicates and spaces requests per key;
//! [`cache::BlockchainCache`] layers stale-while-revalidate policies,
//! retries, batching and optimistic updates on top.

pub mod cache;
pub mod config;
pub mod errors;
pub mod logger;
