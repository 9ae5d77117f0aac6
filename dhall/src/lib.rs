//! The engine of a total, strongly-typed configuration language: the
//! β-normalizer, the bidirectional type checker, the canonical binary
//! codec with semantic hashing, and the asynchronous import resolver.
//! The concrete grammar parser is external; the engine consumes and
//! produces [`dhall_syntax`] expressions.
//!
//! A top-level load is `resolve → typecheck → normalize`, enforced by
//! the phase wrappers in [`phase`].

pub mod error;
pub mod interchange;
pub mod phase;

pub use crate::error::{Error, Result};
pub use crate::interchange::{
    from_dhall, from_dhall_typed, to_dhall, StaticType,
};
pub use crate::phase::resolve::{
    FetchFailure, FetchOutcome, Fetcher, HttpRequest, Resolver,
    SourceParser,
};
pub use crate::phase::{load, Normalized, Parsed, Resolved, Typed};
