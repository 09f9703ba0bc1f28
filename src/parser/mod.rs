//! CWL document normalization
//!
//! Documents are accepted in any of the shorthand forms the CWL schema allows
//! and rewritten into one canonical JSON shape before the model deserializes
//! them. [`LocalNormalizer`] is the built-in implementation; callers with
//! their own resolver (a registry, a packed-document store) plug in through
//! [`Normalizer`].

pub mod document;

pub use document::{shorten_id, LocalNormalizer, NormalizerOptions};

use crate::error::CwlResult;
use serde_json::Value as JsonValue;

/// Canonicalizes raw CWL documents
pub trait Normalizer {
    /// Read the document behind a path or URI and normalize it.
    ///
    /// The returned document's `id` is the absolute URI it was read from
    /// unless it declares an absolute one itself.
    fn normalize_uri(&self, uri: &str) -> CwlResult<JsonValue>;

    /// Normalize an in-memory document. Relative `run` references resolve
    /// against `base`, or the working directory when it is absent.
    fn normalize_document(&self, document: JsonValue, base: Option<&str>) -> CwlResult<JsonValue>;
}
