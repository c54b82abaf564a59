//! # Token Broker Library
//!
//! Resolves a currently valid bearer token for a named scope set, trying in
//! order: the per-user token cache, ambient service-account credentials and
//! the Token Service password grant. The browser implicit flow is available
//! as a separate acquisition mode.
//!
//! Modules:
//! - `cache` — token records, validity checks and the persisted token store
//! - `config` — connection configuration and its per-user provider
//! - `sources` — service-account, password grant and implicit flow acquirers
//! - `resolver` — the fallback chain tying everything together
//! - `secrets` — remembered passwords

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod helpers;
pub mod resilience;
pub mod resolver;
pub mod secrets;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::cache::token::TokenRecord;
pub use crate::cache::validity::is_valid;
pub use crate::error::{TokenError, TokenResult};
pub use crate::resolver::token_resolver::{NamedTokenRequest, TokenResolver};
