use core::hash::Hash;

use crate::error::SnowflakeError;

/// Pure bit codec between a 64-bit ID and its semantic fields.
///
/// Implementors supply the field widths and the raw 64-bit view; packing,
/// unpacking, masks and shifts are all derived from those. The codec is
/// stateless and safe to call concurrently.
pub trait Snowflake:
    Copy + Clone + PartialOrd + Ord + PartialEq + Eq + Hash + std::fmt::Debug
{
    /// Packs the components without range checks. Callers must have validated
    /// each component against its field width; see
    /// [`try_from_component_parts`](Self::try_from_component_parts) for the
    /// checked variant.
    fn from_component_parts(timestamp_offset: u64, worker_id: u64, sequence: u64) -> Self;

    /// Checked encode: fails with [`SnowflakeError::FieldOverflow`] if any
    /// component exceeds its field's bit width.
    fn try_from_component_parts(
        timestamp_offset: u64,
        worker_id: u64,
        sequence: u64,
    ) -> Result<Self, SnowflakeError> {
        if timestamp_offset > Self::timestamp_mask() {
            return Err(SnowflakeError::FieldOverflow {
                field: "timestamp offset",
                value: timestamp_offset,
                max: Self::timestamp_mask(),
            });
        }
        if worker_id > Self::worker_id_mask() {
            return Err(SnowflakeError::FieldOverflow {
                field: "worker id",
                value: worker_id,
                max: Self::worker_id_mask(),
            });
        }
        if sequence > Self::sequence_mask() {
            return Err(SnowflakeError::FieldOverflow {
                field: "sequence",
                value: sequence,
                max: Self::sequence_mask(),
            });
        }
        Ok(Self::from_component_parts(timestamp_offset, worker_id, sequence))
    }

    /// Millisecond offset since the epoch stored in this ID. Total over the
    /// full 64-bit domain; bits outside the field are masked away.
    fn timestamp(&self) -> u64 {
        (self.id() >> Self::timestamp_shift()) & Self::timestamp_mask()
    }

    /// Unix millisecond timestamp recovered by adding the epoch back.
    fn timestamp_with_epoch(&self, epoch: i64) -> i64 {
        (self.timestamp() as i64) + epoch
    }

    fn worker_id(&self) -> u64 {
        (self.id() >> Self::sequence_bits()) & Self::worker_id_mask()
    }

    fn sequence(&self) -> u64 {
        self.id() & Self::sequence_mask()
    }

    /// The raw 64-bit view of the ID.
    fn id(&self) -> u64;

    /// True when no bit outside the defined fields is set.
    fn is_valid(&self) -> bool {
        (self.id() & !Self::valid_mask()) == 0
    }

    fn timestamp_mask() -> u64 {
        (1u64 << Self::timestamp_bits()) - 1
    }

    fn worker_id_mask() -> u64 {
        (1u64 << Self::worker_id_bits()) - 1
    }

    fn sequence_mask() -> u64 {
        (1u64 << Self::sequence_bits()) - 1
    }

    fn valid_mask() -> u64 {
        (Self::timestamp_mask() << Self::timestamp_shift())
            | (Self::worker_id_mask() << Self::sequence_bits())
            | Self::sequence_mask()
    }

    fn timestamp_bits() -> u64;
    fn worker_id_bits() -> u64;
    fn sequence_bits() -> u64;

    fn timestamp_shift() -> u64 {
        Self::worker_id_bits() + Self::sequence_bits()
    }

    fn max_timestamp() -> i64 {
        Self::timestamp_mask() as i64
    }

    fn max_worker_id() -> u64 {
        Self::worker_id_mask()
    }

    fn max_sequence() -> u64 {
        Self::sequence_mask()
    }
}
