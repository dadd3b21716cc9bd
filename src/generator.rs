use crate::error::SnowflakeError;
use crate::snowflake::Snowflake;
use chrono::Utc;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::Duration;

/// Outcome of a single generation attempt.
///
/// `Pending` means the sequence for the current millisecond is exhausted and
/// the caller should wait the given duration before retrying; generator state
/// is untouched so the retry observes a fresh millisecond.
pub enum SnowflakeOperation<S> {
    Ready(S),
    Pending(Duration),
}

/// Last observed timestamp offset (relative to the epoch) and the last
/// dispensed sequence. `last_offset == -1` means no ID has been minted yet.
struct GeneratorState {
    last_offset: i64,
    sequence: u64,
}

/// Stateful, thread-safe ID generator for a single worker id.
///
/// IDs minted by one instance are strictly increasing and unique; the
/// read-modify-write of `(last_offset, sequence)` happens under a mutex whose
/// critical section is a handful of integer operations and no I/O. Instances
/// never share state, so one generator per worker id keeps worker streams
/// independent (useful under test).
pub struct SnowflakeGenerator<S: Snowflake> {
    worker_id: u64,
    state: Mutex<GeneratorState>,
    epoch: i64,
    _marker: PhantomData<S>,
}

impl<S: Snowflake> SnowflakeGenerator<S> {
    /// Creates a generator using the crate-default epoch.
    pub fn new(worker_id: u64) -> Result<Self, SnowflakeError> {
        Self::with_epoch(worker_id, crate::defs::SNOWFLAKE_EPOCH)
    }

    /// Creates a generator with a custom epoch.
    ///
    /// # Arguments
    /// * `worker_id` - Caller-assigned worker discriminator (0-4095)
    /// * `epoch` - Epoch in milliseconds since the Unix epoch
    ///
    /// # Example
    /// ```
    /// use flake64::SnowflakeGenerator;
    ///
    /// // Use a custom epoch (e.g., Jan 1, 2024)
    /// let generator = SnowflakeGenerator::with_epoch(1, 1704067200000).unwrap();
    /// ```
    pub fn with_epoch(worker_id: u64, epoch: i64) -> Result<Self, SnowflakeError> {
        if worker_id > S::max_worker_id() {
            return Err(SnowflakeError::FieldOverflow {
                field: "worker id",
                value: worker_id,
                max: S::max_worker_id(),
            });
        }

        Ok(SnowflakeGenerator {
            worker_id,
            state: Mutex::new(GeneratorState {
                last_offset: -1,
                sequence: 0,
            }),
            epoch,
            _marker: PhantomData,
        })
    }

    /// Returns the epoch being used by this generator
    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Attempts to mint one ID as of the explicit instant `now_ms`
    /// (milliseconds since the Unix epoch).
    ///
    /// Errors leave the generator state unchanged:
    /// * [`SnowflakeError::BeforeEpoch`] - `now_ms` predates the epoch.
    /// * [`SnowflakeError::ClockRegression`] - `now_ms` is earlier than the
    ///   last instant an ID was minted at.
    /// * [`SnowflakeError::FieldOverflow`] - the offset no longer fits the
    ///   timestamp field.
    pub fn try_next_id_at(&self, now_ms: i64) -> Result<SnowflakeOperation<S>, SnowflakeError> {
        if now_ms < self.epoch {
            return Err(SnowflakeError::BeforeEpoch {
                timestamp: now_ms,
                epoch: self.epoch,
            });
        }
        let offset = now_ms - self.epoch;
        if offset > S::max_timestamp() {
            return Err(SnowflakeError::FieldOverflow {
                field: "timestamp offset",
                value: offset as u64,
                max: S::timestamp_mask(),
            });
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| SnowflakeError::GeneratorPoisoned)?;

        if offset < state.last_offset {
            return Err(SnowflakeError::ClockRegression {
                last_offset: state.last_offset,
                current_offset: offset,
            });
        }

        if offset == state.last_offset {
            let next_seq = state.sequence + 1;
            if next_seq > S::max_sequence() {
                // Sequence exhausted for this millisecond. Never wrap to 0
                // within the same millisecond; the caller waits for the clock
                // to advance and retries.
                return Ok(SnowflakeOperation::Pending(Duration::from_millis(1)));
            }
            state.sequence = next_seq;
        } else {
            state.sequence = 0;
            state.last_offset = offset;
        }

        Ok(SnowflakeOperation::Ready(S::from_component_parts(
            offset as u64,
            self.worker_id,
            state.sequence,
        )))
    }

    /// Attempts to mint one ID as of the current wall-clock time.
    pub fn try_next_id(&self) -> Result<SnowflakeOperation<S>, SnowflakeError> {
        self.try_next_id_at(Self::current_timestamp())
    }

    /// Mints one ID, invoking `on_pending` (typically a sleep or a yield)
    /// whenever the current millisecond's sequence is exhausted, then
    /// retrying. The wait is bounded: it ends as soon as the wall clock
    /// advances. Callers needing cancellation should wrap this with an
    /// external deadline.
    pub fn next_id(&self, mut on_pending: impl FnMut(Duration)) -> Result<S, SnowflakeError> {
        loop {
            match self.try_next_id()? {
                SnowflakeOperation::Ready(id) => return Ok(id),
                SnowflakeOperation::Pending(wait) => {
                    on_pending(wait);
                }
            }
        }
    }

    /// Mints `count` IDs under a single lock acquisition. The returned IDs
    /// are strictly increasing.
    pub fn next_id_bulk(
        &self,
        count: usize,
        mut on_pending: impl FnMut(Duration),
    ) -> Result<Vec<S>, SnowflakeError> {
        let mut ids = Vec::with_capacity(count);

        let mut state = self
            .state
            .lock()
            .map_err(|_| SnowflakeError::GeneratorPoisoned)?;

        for _ in 0..count {
            let mut now_ms = Self::current_timestamp();
            if now_ms < self.epoch {
                return Err(SnowflakeError::BeforeEpoch {
                    timestamp: now_ms,
                    epoch: self.epoch,
                });
            }
            let mut offset = now_ms - self.epoch;

            // All checks happen before the state update so an error leaves
            // `(last_offset, sequence)` exactly as the previous iteration
            // left it.
            if offset > S::max_timestamp() {
                return Err(SnowflakeError::FieldOverflow {
                    field: "timestamp offset",
                    value: offset as u64,
                    max: S::timestamp_mask(),
                });
            }

            if offset < state.last_offset {
                return Err(SnowflakeError::ClockRegression {
                    last_offset: state.last_offset,
                    current_offset: offset,
                });
            }

            if offset == state.last_offset {
                if state.sequence == S::max_sequence() {
                    // Exhausted: wait out the rest of this millisecond.
                    while offset <= state.last_offset {
                        on_pending(Duration::from_millis(1));
                        now_ms = Self::current_timestamp();
                        offset = now_ms - self.epoch;
                    }
                    if offset > S::max_timestamp() {
                        return Err(SnowflakeError::FieldOverflow {
                            field: "timestamp offset",
                            value: offset as u64,
                            max: S::timestamp_mask(),
                        });
                    }
                    state.sequence = 0;
                    state.last_offset = offset;
                } else {
                    state.sequence += 1;
                }
            } else {
                state.sequence = 0;
                state.last_offset = offset;
            }

            ids.push(S::from_component_parts(
                offset as u64,
                self.worker_id,
                state.sequence,
            ));
        }

        Ok(ids)
    }

    fn current_timestamp() -> i64 {
        Utc::now().timestamp_millis()
    }
}
