//! The feed ingestion pipeline: raw bytes in, canonical items out.
//!
//! Stages, in the order one source flows through them:
//!
//! - [`document`] - tolerant XML parsing into a generic element tree
//! - [`normalize`] - mapping RSS/Atom/RDF shapes onto the canonical
//!   [`Item`] via explicit per-field fallback chains
//! - [`identity`] - stable de-duplication ids
//! - [`image`] - best-effort lead-image heuristics
//! - [`fetch`] - one source's whole fetch+parse+normalize task
//!
//! The fan-out across sources and the merge/sort live one level up, in
//! [`crate::aggregator`].

mod document;
mod fetch;
mod identity;
mod image;
mod normalize;

pub use document::{Document, DocumentError, Element};
pub use fetch::{fetch_source, FetchError};
pub use identity::assign_id;
pub use image::{ImageExtractor, ImageRuleError};
pub use normalize::{normalize, Item, NormalizeError};
