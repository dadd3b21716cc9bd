use std::fmt;

/// Errors produced by the codec and the generators.
///
/// Every variant carries the offending values so a failure can be diagnosed
/// without re-deriving generator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnowflakeError {
    /// An encode input does not fit in its field's bit width. `field` names
    /// the component ("timestamp offset", "worker id" or "sequence").
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },
    /// Text input is not a valid non-negative base-10 integer.
    MalformedId(String),
    /// A raw integer constructor received a negative value.
    NegativeId(i64),
    /// The requested instant predates the generator's epoch.
    BeforeEpoch { timestamp: i64, epoch: i64 },
    /// The wall clock moved backward relative to the last observed offset
    /// (NTP correction, VM pause). The generator refuses to mint rather than
    /// risk a duplicate or out-of-order ID; callers may retry after a delay.
    ClockRegression {
        last_offset: i64,
        current_offset: i64,
    },
    /// The generator's state mutex was poisoned by a panicking thread.
    GeneratorPoisoned,
}

impl fmt::Display for SnowflakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnowflakeError::FieldOverflow { field, value, max } => {
                write!(f, "{} {} exceeds field maximum {}", field, value, max)
            }
            SnowflakeError::MalformedId(msg) => {
                write!(f, "Malformed snowflake ID: {}", msg)
            }
            SnowflakeError::NegativeId(value) => {
                write!(f, "Snowflake ID cannot be negative, got {}", value)
            }
            SnowflakeError::BeforeEpoch { timestamp, epoch } => {
                write!(f, "Timestamp {} predates the epoch {}", timestamp, epoch)
            }
            SnowflakeError::ClockRegression {
                last_offset,
                current_offset,
            } => {
                write!(
                    f,
                    "Clock moved backwards ({} -> {}). Refusing to generate id",
                    last_offset, current_offset
                )
            }
            SnowflakeError::GeneratorPoisoned => {
                write!(f, "ID generator mutex was poisoned by a panicking thread")
            }
        }
    }
}

impl std::error::Error for SnowflakeError {}
