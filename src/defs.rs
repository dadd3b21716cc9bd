//! Canonical bit layout and epoch constants.
//!
//! The 64-bit ID is packed MSB-first as
//! `timestamp offset (41) | worker id (12) | sequence (10)`, leaving the top
//! bit permanently zero so the value stays non-negative in an `i64` and
//! numeric ordering matches creation order over the whole timestamp range.
//! Historical snowflake variants disagree on these widths, so every shift and
//! mask in the crate is derived from the constants below rather than written
//! inline.

/// Width of the millisecond timestamp offset field. 2^41 ms is roughly 69
/// years of usable lifetime past the epoch.
pub const TIMESTAMP_BITS: u64 = 41;

/// Width of the caller-supplied worker discriminator field.
pub const WORKER_ID_BITS: u64 = 12;

/// Width of the per-millisecond sequence counter field.
pub const SEQUENCE_BITS: u64 = 10;

/// Default epoch: 2024-01-01T00:00:00Z, in milliseconds since the Unix epoch.
/// All timestamp offsets stored in an ID are relative to this instant unless a
/// generator was built with a custom epoch.
pub const SNOWFLAKE_EPOCH: i64 = 1_704_067_200_000;

/// Largest worker id that fits in [`WORKER_ID_BITS`] (4095).
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;

/// Largest sequence value that fits in [`SEQUENCE_BITS`] (1023).
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest timestamp offset (in ms) that fits in [`TIMESTAMP_BITS`].
pub const MAX_TIMESTAMP_MS: i64 = ((1u64 << TIMESTAMP_BITS) - 1) as i64;
