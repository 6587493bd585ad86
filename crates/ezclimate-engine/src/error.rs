//! Engine errors.
//!
//! # Error Categories
//!
//! - **Configuration errors**: [`Error::InvalidConfig`], [`Error::CacheVersion`],
//!   [`Error::CacheMismatch`]
//! - **Topology errors**: [`Error::MalformedTopology`]
//! - **Numeric errors**: [`Error::DegenerateSystem`], [`Error::NonFinite`]
//! - **Cache I/O errors**: [`Error::Io`], [`Error::Serialization`],
//!   [`Error::Deserialization`], [`Error::Compression`], [`Error::Decompression`]
//!
//! # Error Handling Policy
//!
//! Every error here is fatal to the run. The engine will not silently correct
//! or mask a mismatch: a stale cache, an inconsistent tree, or a singular
//! interpolation system is surfaced immediately with the offending field or
//! index, and no partial computation proceeds.

use std::path::PathBuf;

use thiserror::Error;

/// Engine result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the damage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value failed validation before any computation ran.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The scenario tree is internally inconsistent (index ranges, probability
    /// sums, decision-time ordering) or does not fit the simulation controls.
    #[error("malformed topology: {0}")]
    MalformedTopology(String),

    /// The cache file was written by an incompatible format version.
    #[error("cache format version mismatch: file has v{found}, engine expects v{expected}")]
    CacheVersion { found: u32, expected: u32 },

    /// One or more cached simulation parameters disagree with the current run.
    ///
    /// The message lists every mismatched field with its cached and current
    /// value. Set `force_simul` to resimulate and overwrite the cache.
    #[error("cache parameters do not match current run: {0}")]
    CacheMismatch(String),

    /// A 3x3 interpolation system was singular or produced non-finite
    /// coefficients. Cannot occur for strictly decreasing breakpoints from a
    /// validated configuration.
    #[error("degenerate interpolation system at state {state}, period {period}, segment {segment}")]
    DegenerateSystem {
        state: usize,
        period: usize,
        segment: usize,
    },

    /// A simulated quantity came out NaN or infinite.
    #[error("non-finite value in {context}")]
    NonFinite { context: String },

    /// Cache file I/O failed. The cache is not optional once established, so
    /// this does not fall back to resimulation.
    #[error("cache I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache encoding failed.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// Cache decoding failed (corrupt or truncated file).
    #[error("cache deserialization error: {0}")]
    Deserialization(String),

    /// Cache compression failed.
    #[error("cache compression error: {0}")]
    Compression(String),

    /// Cache decompression failed.
    #[error("cache decompression error: {0}")]
    Decompression(String),
}
