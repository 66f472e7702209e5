use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z in milliseconds since Unix epoch.
const ACCOUNTS_EPOCH_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1; // 4095

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit snowflake ID generator.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the accounts epoch
/// - Bits 21–12: Worker ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter, max 4096/ms
///
/// IDs from one generator are positive and strictly increasing, which is
/// what a store needs from a surrogate key.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            u64::from(worker_id) < (1 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: u64::from(worker_id),
            // A clock reading before the epoch issues from sequence 1, never ID 0.
            state: Mutex::new(State {
                last_ms: ACCOUNTS_EPOCH_MS,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        self.generate_with(current_ms)
    }

    fn generate_with(&self, clock: impl Fn() -> u64) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // A clock that steps backwards keeps issuing from the last seen
        // millisecond so IDs never go down.
        let mut now_ms = clock().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now_ms = next_ms(&clock, state.last_ms);
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(ACCOUNTS_EPOCH_MS);
        let id = (ts << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;

        id as i64
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// First millisecond after `last_ms`: waits for the clock, or takes
/// `last_ms + 1` if the clock is behind.
fn next_ms(clock: &impl Fn() -> u64, last_ms: u64) -> u64 {
    loop {
        let now = clock();
        if now > last_ms {
            return now;
        }
        if now < last_ms {
            return last_ms + 1;
        }
        std::hint::spin_loop();
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(ACCOUNTS_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    let ts = (id as u64) >> (WORKER_BITS + SEQUENCE_BITS);
    ts + ACCOUNTS_EPOCH_MS
}
