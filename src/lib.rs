use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::TryFrom;
use std::env;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "sqlx")]
use sqlx::Type;

pub mod defs;
pub mod error;
pub mod generator;
pub mod snowflake;

#[cfg(feature = "tokio")]
pub mod async_generator;

pub use defs::*;
use error::SnowflakeError;
pub use snowflake::Snowflake;

/// Type alias — the concrete generator is the generic one parameterised on `SnowflakeId`.
pub type SnowflakeGenerator = generator::SnowflakeGenerator<SnowflakeId>;

#[cfg(feature = "tokio")]
pub type AsyncSnowflakeGenerator = async_generator::AsyncSnowflakeGenerator<SnowflakeId>;

/// A 64-bit snowflake ID: 41 bits of millisecond timestamp offset, 12 bits of
/// worker id, 10 bits of sequence. Numerically larger IDs were created later.
///
/// The top bit is never set, so the value is a non-negative `i64` that
/// round-trips through `BIGINT` columns and other signed-64 hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "sqlx", derive(Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "BIGINT"))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct SnowflakeId(i64);

// ---------------------------------------------------------------------------
// Snowflake trait implementation
// ---------------------------------------------------------------------------

impl Snowflake for SnowflakeId {
    fn from_component_parts(timestamp_offset: u64, worker_id: u64, sequence: u64) -> Self {
        let id = (timestamp_offset << Self::timestamp_shift())
            | (worker_id << Self::sequence_bits())
            | sequence;
        SnowflakeId(id as i64)
    }

    fn id(&self) -> u64 {
        self.0 as u64
    }

    fn timestamp_bits() -> u64 {
        TIMESTAMP_BITS
    }

    fn worker_id_bits() -> u64 {
        WORKER_ID_BITS
    }

    fn sequence_bits() -> u64 {
        SEQUENCE_BITS
    }
}

// ---------------------------------------------------------------------------
// Inherent methods (i64-facing API)
// ---------------------------------------------------------------------------

impl SnowflakeId {
    /// The zero ID: epoch instant, worker 0, sequence 0. Also what the
    /// `"null"` sentinel parses to.
    pub const ZERO: SnowflakeId = SnowflakeId(0);

    pub fn new(value: i64) -> Result<Self, SnowflakeError> {
        if value < 0 {
            return Err(SnowflakeError::NegativeId(value));
        }
        Ok(SnowflakeId(value))
    }

    /// Creates a SnowflakeId without validation. Only use this if you're certain the value is valid.
    ///
    /// # Safety
    /// The caller must ensure that the value is non-negative.
    pub fn new_unchecked(value: i64) -> Self {
        SnowflakeId(value)
    }

    pub fn id(&self) -> i64 {
        self.0
    }

    /// Returns the timestamp offset (in milliseconds) stored in this snowflake ID.
    /// This is NOT a Unix timestamp. To get the actual Unix timestamp, use `timestamp_with_epoch()`.
    pub fn timestamp(&self) -> i64 {
        <Self as Snowflake>::timestamp(self) as i64
    }

    /// Returns the timestamp in milliseconds since Unix epoch, using a custom epoch
    pub fn timestamp_with_epoch(&self, epoch: i64) -> i64 {
        <Self as Snowflake>::timestamp_with_epoch(self, epoch)
    }

    pub fn worker_id(&self) -> u64 {
        <Self as Snowflake>::worker_id(self)
    }

    pub fn sequence(&self) -> u64 {
        <Self as Snowflake>::sequence(self)
    }

    /// Encodes a caller-chosen instant with the sequence forced to 0,
    /// bypassing any generator state.
    ///
    /// This is NOT a way to mint unique IDs — it carries no uniqueness
    /// guarantee. Its purpose is synthesizing bounds for range queries: the
    /// result is the smallest possible ID a generator with `worker_id` could
    /// have produced at or after `timestamp_ms`. Pass `worker_id = 0` for the
    /// global lower bound at that instant.
    pub fn from_instant(timestamp_ms: i64, worker_id: u64) -> Result<Self, SnowflakeError> {
        Self::from_instant_with_epoch(timestamp_ms, worker_id, SNOWFLAKE_EPOCH)
    }

    /// [`from_instant`](Self::from_instant) against a custom epoch.
    pub fn from_instant_with_epoch(
        timestamp_ms: i64,
        worker_id: u64,
        epoch: i64,
    ) -> Result<Self, SnowflakeError> {
        if timestamp_ms < epoch {
            return Err(SnowflakeError::BeforeEpoch {
                timestamp: timestamp_ms,
                epoch,
            });
        }
        Self::try_from_component_parts((timestamp_ms - epoch) as u64, worker_id, 0)
    }

    /// [`from_instant`](Self::from_instant) taking a chrono instant.
    pub fn from_datetime(instant: DateTime<Utc>, worker_id: u64) -> Result<Self, SnowflakeError> {
        Self::from_instant(instant.timestamp_millis(), worker_id)
    }

    /// Reads and parses an ID from the named environment variable.
    ///
    /// Returns `Ok(None)` when the variable is absent — absence is not an
    /// error, unlike a variable that is present but fails to parse.
    pub fn from_env(name: &str) -> Result<Option<Self>, SnowflakeError> {
        match env::var(name) {
            Ok(value) => value.parse().map(Some),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => Err(SnowflakeError::MalformedId(format!(
                "environment variable {} is not valid UTF-8",
                name
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FromStr
// ---------------------------------------------------------------------------

/// Token some upstream serializers emit in place of an absent ID.
const NULL_SENTINEL: &str = "null";

impl FromStr for SnowflakeId {
    type Err = SnowflakeError;

    /// Parses the canonical base-10 representation.
    ///
    /// Named exception: the literal `"null"` parses to [`SnowflakeId::ZERO`]
    /// rather than failing. Some upstream systems emit that token instead of
    /// omitting the field, and this leniency keeps those payloads readable.
    /// It applies to that exact token only; any other non-numeric text is a
    /// [`SnowflakeError::MalformedId`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NULL_SENTINEL {
            return Ok(SnowflakeId::ZERO);
        }

        let value = s
            .parse::<i64>()
            .map_err(|e| SnowflakeError::MalformedId(format!("{:?}: {}", s, e)))?;

        if value < 0 {
            return Err(SnowflakeError::MalformedId(format!(
                "{:?}: snowflake IDs are non-negative",
                s
            )));
        }

        Ok(SnowflakeId(value))
    }
}

// ---------------------------------------------------------------------------
// Display, TryFrom, Into, Serde
// ---------------------------------------------------------------------------

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for SnowflakeId {
    type Error = SnowflakeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        SnowflakeId::new(value)
    }
}

impl From<SnowflakeId> for i64 {
    fn from(id: SnowflakeId) -> Self {
        id.0
    }
}

/// Human-readable formats get the ID as a quoted decimal string so runtimes
/// whose numeric type is a 53-bit float never see it as a number. Binary
/// formats keep the native i64.
impl Serialize for SnowflakeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for SnowflakeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SnowflakeIdVisitor;

        impl<'de> serde::de::Visitor<'de> for SnowflakeIdVisitor {
            type Value = SnowflakeId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string, integer or null representing a snowflake id")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value > i64::MAX as u64 {
                    return Err(E::custom("snowflake id value exceeds i64::MAX"));
                }
                Ok(SnowflakeId::new_unchecked(value as i64))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value < 0 {
                    Err(E::custom("snowflake id cannot be negative"))
                } else {
                    Ok(SnowflakeId::new_unchecked(value))
                }
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&value)
            }

            // Same leniency as the "null" text sentinel.
            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(SnowflakeId::ZERO)
            }
        }

        deserializer.deserialize_any(SnowflakeIdVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::thread;

    #[test]
    fn test_round_trip_components() {
        let cases = [
            (0u64, 0u64, 0u64),
            (0, 123, 0),
            (1, 0, 1),
            (1_000, 4_095, 1_023),
            ((1u64 << TIMESTAMP_BITS) - 1, MAX_WORKER_ID, MAX_SEQUENCE),
        ];

        for (t, w, s) in cases {
            let id = SnowflakeId::try_from_component_parts(t, w, s).unwrap();
            assert_eq!(id.timestamp() as u64, t);
            assert_eq!(id.worker_id(), w);
            assert_eq!(id.sequence(), s);
        }
    }

    #[test]
    fn test_top_bit_stays_clear_at_max_timestamp() {
        let max_t = (1u64 << TIMESTAMP_BITS) - 1;

        let late =
            SnowflakeId::try_from_component_parts(max_t, MAX_WORKER_ID, MAX_SEQUENCE).unwrap();
        assert!(late.id() >= 0);

        // Ordering holds right up to the end of the timestamp range.
        let earlier =
            SnowflakeId::try_from_component_parts(max_t - 1, MAX_WORKER_ID, MAX_SEQUENCE).unwrap();
        assert!(earlier.id() >= 0);
        assert!(earlier < late);
    }

    #[test]
    fn test_is_valid_excludes_the_top_bit() {
        // The three fields cover exactly the low 63 bits.
        assert_eq!(SnowflakeId::valid_mask(), u64::MAX >> 1);

        let id = SnowflakeId::try_from_component_parts(1, 2, 3).unwrap();
        assert!(id.is_valid());
    }

    #[test]
    fn test_canonical_example() {
        // 41/12/10 layout: worker 123 at offset 0 is 123 << 10.
        let id = SnowflakeId::try_from_component_parts(0, 123, 0).unwrap();
        assert_eq!(<SnowflakeId as Snowflake>::id(&id), 125_952);
        assert_eq!(id.to_string(), "125952");

        let decoded = SnowflakeId::new(125_952).unwrap();
        assert_eq!(decoded.timestamp(), 0);
        assert_eq!(decoded.worker_id(), 123);
        assert_eq!(decoded.sequence(), 0);
    }

    #[test]
    fn test_encode_rejects_field_overflow() {
        let t_over = SnowflakeId::try_from_component_parts(1u64 << TIMESTAMP_BITS, 0, 0);
        assert!(matches!(
            t_over,
            Err(SnowflakeError::FieldOverflow {
                field: "timestamp offset",
                ..
            })
        ));

        let w_over = SnowflakeId::try_from_component_parts(0, MAX_WORKER_ID + 1, 0);
        assert!(matches!(
            w_over,
            Err(SnowflakeError::FieldOverflow {
                field: "worker id",
                value,
                max,
            }) if value == MAX_WORKER_ID + 1 && max == MAX_WORKER_ID
        ));

        let s_over = SnowflakeId::try_from_component_parts(0, 0, MAX_SEQUENCE + 1);
        assert!(matches!(
            s_over,
            Err(SnowflakeError::FieldOverflow {
                field: "sequence",
                ..
            })
        ));
    }

    #[test]
    fn test_from_instant_epoch_boundary() {
        let before = SnowflakeId::from_instant(SNOWFLAKE_EPOCH - 1, 0);
        assert!(matches!(
            before,
            Err(SnowflakeError::BeforeEpoch { timestamp, epoch })
                if timestamp == SNOWFLAKE_EPOCH - 1 && epoch == SNOWFLAKE_EPOCH
        ));

        let at = SnowflakeId::from_instant(SNOWFLAKE_EPOCH, 0).unwrap();
        assert_eq!(at, SnowflakeId::ZERO);
        assert_eq!(at.timestamp(), 0);
    }

    #[test]
    fn test_from_instant_is_a_lower_bound() {
        let instant = SNOWFLAKE_EPOCH + 86_400_000;
        let bound = SnowflakeId::from_instant(instant, 0).unwrap();
        assert_eq!(bound.sequence(), 0);
        assert_eq!(bound.worker_id(), 0);

        // Any ID minted at or after that instant compares greater or equal.
        let generator = SnowflakeGenerator::new(17).unwrap();
        let minted = generator.next_id(|_| thread::yield_now()).unwrap();
        if minted.timestamp() >= bound.timestamp() {
            assert!(bound <= minted);
        }
    }

    #[test]
    fn test_from_instant_rejects_bad_worker() {
        let result = SnowflakeId::from_instant(SNOWFLAKE_EPOCH, MAX_WORKER_ID + 1);
        assert!(matches!(
            result,
            Err(SnowflakeError::FieldOverflow {
                field: "worker id",
                ..
            })
        ));
    }

    #[test]
    fn test_from_datetime_matches_from_instant() {
        let instant = chrono::DateTime::from_timestamp_millis(SNOWFLAKE_EPOCH + 5_000).unwrap();
        let a = SnowflakeId::from_datetime(instant, 3).unwrap();
        let b = SnowflakeId::from_instant(SNOWFLAKE_EPOCH + 5_000, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_snowflake_generator() {
        let generator = SnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
        let id1 = generator.next_id(|_| thread::yield_now()).unwrap();
        let id2 = generator.next_id(|_| thread::yield_now()).unwrap();

        assert_ne!(id1, id2);
        assert!(id1.id() < id2.id());
    }

    #[test]
    fn test_snowflake_id_components() {
        let generator = SnowflakeGenerator::with_epoch(42, SNOWFLAKE_EPOCH).unwrap();
        let id = generator.next_id(|_| thread::yield_now()).unwrap();

        assert_eq!(id.worker_id(), 42);
        // timestamp() returns offset, not Unix timestamp
        assert!(id.timestamp() > 0);
        // timestamp_with_epoch() returns actual Unix timestamp
        assert!(id.timestamp_with_epoch(SNOWFLAKE_EPOCH) > SNOWFLAKE_EPOCH);
    }

    #[test]
    fn test_serialization() {
        let id = SnowflakeId::new(123456789012345678).unwrap();

        let json_string = serde_json::to_string(&id).unwrap();
        assert_eq!(json_string, "\"123456789012345678\"");

        let deserialized: SnowflakeId = serde_json::from_str(&json_string).unwrap();
        assert_eq!(id, deserialized);

        let from_int: SnowflakeId = serde_json::from_str("123456789012345678").unwrap();
        assert_eq!(id, from_int);
    }

    #[test]
    fn test_deserialize_null_yields_zero() {
        let from_null: SnowflakeId = serde_json::from_str("null").unwrap();
        assert_eq!(from_null, SnowflakeId::ZERO);

        let from_null_string: SnowflakeId = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(from_null_string, SnowflakeId::ZERO);
    }

    #[test]
    fn test_display() {
        let id = SnowflakeId::new(987654321098765432).unwrap();
        assert_eq!(format!("{}", id), "987654321098765432");
        assert_eq!(SnowflakeId::ZERO.to_string(), "0");
    }

    #[test]
    fn test_null_sentinel_parses_to_zero() {
        assert_eq!(
            SnowflakeId::from_str("null").unwrap(),
            SnowflakeId::from_str("0").unwrap()
        );
        // The leniency is for that exact token only.
        assert!(SnowflakeId::from_str("NULL").is_err());
        assert!(SnowflakeId::from_str("none").is_err());
    }

    #[test]
    fn test_from_str_rejects_negative() {
        let result = SnowflakeId::from_str("-123");
        assert!(matches!(result, Err(SnowflakeError::MalformedId(_))));
    }

    #[test]
    fn test_from_str_rejects_invalid() {
        let result = SnowflakeId::from_str("not-a-number");
        assert!(matches!(result, Err(SnowflakeError::MalformedId(_))));
    }

    #[test]
    fn test_from_str_accepts_valid() {
        let id = SnowflakeId::from_str("123456789012345678").unwrap();
        assert_eq!(id.id(), 123456789012345678);
    }

    #[test]
    fn test_from_str_accepts_zero() {
        let id = SnowflakeId::from_str("0").unwrap();
        assert_eq!(id.id(), 0);
    }

    #[test]
    fn test_new_rejects_negative() {
        let result = SnowflakeId::new(-123);
        assert!(matches!(result, Err(SnowflakeError::NegativeId(-123))));
    }

    #[test]
    fn test_try_from_rejects_negative() {
        use std::convert::TryFrom;
        let result = SnowflakeId::try_from(-456i64);
        assert!(result.is_err());
    }

    #[test]
    fn test_try_from_accepts_valid() {
        use std::convert::TryFrom;
        let id = SnowflakeId::try_from(123456789012345678i64).unwrap();
        assert_eq!(id.id(), 123456789012345678);
    }

    #[test]
    fn test_from_env() {
        // Distinct variable names; tests in one binary share the process env.
        env::set_var("FLAKE64_TEST_WORKER_A", "125952");
        let present = SnowflakeId::from_env("FLAKE64_TEST_WORKER_A").unwrap();
        assert_eq!(present, Some(SnowflakeId::new(125_952).unwrap()));

        let absent = SnowflakeId::from_env("FLAKE64_TEST_WORKER_UNSET").unwrap();
        assert_eq!(absent, None);

        env::set_var("FLAKE64_TEST_WORKER_B", "not-an-id");
        let garbage = SnowflakeId::from_env("FLAKE64_TEST_WORKER_B");
        assert!(matches!(garbage, Err(SnowflakeError::MalformedId(_))));

        env::set_var("FLAKE64_TEST_WORKER_C", "null");
        let sentinel = SnowflakeId::from_env("FLAKE64_TEST_WORKER_C").unwrap();
        assert_eq!(sentinel, Some(SnowflakeId::ZERO));
    }

    #[cfg(feature = "tokio")]
    mod async_tests {
        use super::*;
        use crate::generator::SnowflakeOperation;

        #[tokio::test]
        async fn test_async_generate() {
            let generator = AsyncSnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
            let id1 = generator.next_id().await.unwrap();
            let id2 = generator.next_id().await.unwrap();

            assert_ne!(id1, id2);
            assert!(id1.id() < id2.id());
        }

        #[tokio::test]
        async fn test_async_generate_bulk() {
            let generator = AsyncSnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
            let ids = generator.next_id_bulk(100).await.unwrap();

            assert_eq!(ids.len(), 100);

            for i in 1..ids.len() {
                assert!(ids[i - 1].id() < ids[i].id());
            }
        }

        #[tokio::test]
        async fn test_async_try_next_id() {
            let generator = AsyncSnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
            let result = generator.try_next_id().await.unwrap();

            match result {
                SnowflakeOperation::Ready(id) => {
                    assert!(id.id() > 0);
                    assert_eq!(id.worker_id(), 1);
                }
                SnowflakeOperation::Pending(_) => panic!("Expected Ready, got Pending"),
            }
        }

        #[tokio::test]
        async fn test_async_sequence_exhaustion_pends() {
            let generator = AsyncSnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
            let now = SNOWFLAKE_EPOCH + 100;

            for _ in 0..=MAX_SEQUENCE {
                match generator.try_next_id_at(now).await.unwrap() {
                    SnowflakeOperation::Ready(_) => {}
                    SnowflakeOperation::Pending(_) => panic!("exhausted too early"),
                }
            }

            assert!(matches!(
                generator.try_next_id_at(now).await.unwrap(),
                SnowflakeOperation::Pending(_)
            ));
        }

        #[tokio::test]
        async fn test_async_clock_regression() {
            let generator = AsyncSnowflakeGenerator::with_epoch(1, SNOWFLAKE_EPOCH).unwrap();
            let now = SNOWFLAKE_EPOCH + 100;

            generator.try_next_id_at(now).await.unwrap();
            let result = generator.try_next_id_at(now - 10).await;
            assert!(matches!(result, Err(SnowflakeError::ClockRegression { .. })));
        }
    }
}
