//! 12-byte sortable document identifier: timestamp | machine | pid | counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide monotonic counter, seeded once at first use.
///
/// Mirrors a global identity-generation singleton: object ids must sort
/// consistently within a process even across threads, so the counter lives
/// for the lifetime of the process rather than per-database.
fn next_counter() -> u32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| AtomicU32::new(random_seed()));
    counter.fetch_add(1, AtomicOrdering::Relaxed)
}

fn random_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    nanos ^ (std::process::id().wrapping_mul(2654435761))
}

fn machine_id() -> [u8; 3] {
    static MACHINE: OnceLock<[u8; 3]> = OnceLock::new();
    *MACHINE.get_or_init(|| {
        let hostname = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "tinydb-host".to_string());
        let mut hash: u32 = 2166136261;
        for byte in hostname.bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(16777619);
        }
        let bytes = hash.to_be_bytes();
        [bytes[1], bytes[2], bytes[3]]
    })
}

/// A 12-byte identifier: 4-byte unix-seconds timestamp, 3-byte machine id,
/// 2-byte process id, 3-byte monotonic counter. Sorts by creation order
/// across the timestamp/counter components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    /// Generate a new id using the current time and the process-wide counter.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        let pid = (std::process::id() & 0xFFFF) as u16;
        let counter = next_counter() & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..7].copy_from_slice(&machine_id());
        bytes[7..9].copy_from_slice(&pid.to_be_bytes());
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes(self.0[0..4].try_into().unwrap())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct_and_ordered() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(a < b || a.timestamp_secs() <= b.timestamp_secs());
    }

    #[test]
    fn round_trips_through_bytes() {
        let id = ObjectId::new();
        let rebuilt = ObjectId::from_bytes(*id.as_bytes());
        assert_eq!(id, rebuilt);
    }

    #[test]
    fn display_is_24_hex_chars() {
        let id = ObjectId::new();
        assert_eq!(id.to_string().len(), 24);
    }
}
