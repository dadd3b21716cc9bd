use crate::error::SnowflakeError;
use crate::generator::SnowflakeOperation;
use crate::snowflake::Snowflake;
use chrono::Utc;
use std::marker::PhantomData;
use tokio::sync::Mutex;

struct GeneratorState {
    last_offset: i64,
    sequence: u64,
}

/// Async counterpart of [`SnowflakeGenerator`](crate::generator::SnowflakeGenerator).
///
/// Same transition rules over a `tokio::sync::Mutex`; when the current
/// millisecond's sequence is exhausted, `next_id` awaits a timer instead of
/// blocking, so the wait yields to the scheduler rather than stalling the
/// event loop.
pub struct AsyncSnowflakeGenerator<S: Snowflake> {
    worker_id: u64,
    state: Mutex<GeneratorState>,
    epoch: i64,
    _marker: PhantomData<S>,
}

impl<S: Snowflake> AsyncSnowflakeGenerator<S> {
    pub fn new(worker_id: u64) -> Result<Self, SnowflakeError> {
        Self::with_epoch(worker_id, crate::defs::SNOWFLAKE_EPOCH)
    }

    pub fn with_epoch(worker_id: u64, epoch: i64) -> Result<Self, SnowflakeError> {
        if worker_id > S::max_worker_id() {
            return Err(SnowflakeError::FieldOverflow {
                field: "worker id",
                value: worker_id,
                max: S::max_worker_id(),
            });
        }

        Ok(AsyncSnowflakeGenerator {
            worker_id,
            state: Mutex::new(GeneratorState {
                last_offset: -1,
                sequence: 0,
            }),
            epoch,
            _marker: PhantomData,
        })
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Attempts to mint one ID as of the explicit instant `now_ms`. Errors
    /// leave the generator state unchanged; see
    /// [`SnowflakeGenerator::try_next_id_at`](crate::generator::SnowflakeGenerator::try_next_id_at).
    pub async fn try_next_id_at(
        &self,
        now_ms: i64,
    ) -> Result<SnowflakeOperation<S>, SnowflakeError> {
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

        let mut state = self.state.lock().await;

        if offset < state.last_offset {
            return Err(SnowflakeError::ClockRegression {
                last_offset: state.last_offset,
                current_offset: offset,
            });
        }

        if offset == state.last_offset {
            let next_seq = state.sequence + 1;
            if next_seq > S::max_sequence() {
                return Ok(SnowflakeOperation::Pending(
                    std::time::Duration::from_millis(1),
                ));
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

    pub async fn try_next_id(&self) -> Result<SnowflakeOperation<S>, SnowflakeError> {
        self.try_next_id_at(Self::current_timestamp()).await
    }

    /// Mints one ID, sleeping across millisecond boundaries when the sequence
    /// is exhausted.
    pub async fn next_id(&self) -> Result<S, SnowflakeError> {
        loop {
            match self.try_next_id().await? {
                SnowflakeOperation::Ready(id) => return Ok(id),
                SnowflakeOperation::Pending(wait) => {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    pub async fn next_id_bulk(&self, count: usize) -> Result<Vec<S>, SnowflakeError> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.next_id().await?);
        }
        Ok(ids)
    }

    fn current_timestamp() -> i64 {
        Utc::now().timestamp_millis()
    }
}
