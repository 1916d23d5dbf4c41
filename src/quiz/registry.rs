//! Process-wide table of active room codes.

use std::collections::HashSet;

use rand::Rng;
use tokio::sync::Mutex;

/// Allocates and reclaims the short codes participants use to find a room.
///
/// The mutex here guards only the code namespace. Per-room state carries its
/// own lock, so allocating a code for one host never blocks activity in
/// unrelated rooms.
pub struct RoomRegistry {
    codes: Mutex<HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            codes: Mutex::new(HashSet::new()),
        }
    }

    /// Generate a random six-digit room code
    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(100000..999999))
    }

    /// Produces a code not currently active. Check-and-insert happens
    /// atomically under the registry lock, so concurrent hosts can never be
    /// handed the same code; collisions retry internally.
    pub async fn allocate(&self) -> String {
        let mut codes = self.codes.lock().await;
        loop {
            let code = Self::generate_code();
            if codes.insert(code.clone()) {
                tracing::debug!(code = %code, active = codes.len(), "Room code allocated");
                return code;
            }
        }
    }

    /// Returns a code to the pool. Idempotent: releasing a code that is not
    /// active is a no-op.
    pub async fn release(&self, code: &str) {
        let mut codes = self.codes.lock().await;
        if codes.remove(code) {
            tracing::debug!(code = %code, active = codes.len(), "Room code released");
        }
    }

    pub async fn is_active(&self, code: &str) -> bool {
        self.codes.lock().await.contains(code)
    }

    pub async fn active_count(&self) -> usize {
        self.codes.lock().await.len()
    }
}
