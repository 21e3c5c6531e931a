//! Persistence collaborators reached by `txtFile.*`, `binFile.*` and
//! `udpSocket.*` transformation targets.
//!
//! The engine only hands over payloads; pooling, delayed close and retries
//! belong to the implementation.

use parking_lot::Mutex;

/// How a file target's payload is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Text,
    Binary,
}

/// File and socket writers. Success is all the engine learns.
pub trait Persistence: Send + Sync {
    /// Append `payload` to the file at `path`.
    fn write_file(&self, path: &str, payload: &[u8], mode: WriteMode, close_delay_us: u64) -> bool;

    /// Send `payload` as one datagram to `address` (`host:port`).
    fn write_socket(&self, address: &str, payload: &[u8]) -> bool;
}

/// One captured persistence call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceWrite {
    File {
        path: String,
        payload: Vec<u8>,
        mode: WriteMode,
        close_delay_us: u64,
    },
    Socket {
        address: String,
        payload: Vec<u8>,
    },
}

/// In-memory writer that keeps every call, for offline runs and tests.
#[derive(Debug, Default)]
pub struct RecordingPersistence {
    writes: Mutex<Vec<PersistenceWrite>>,
    fail: bool,
}

impl RecordingPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that rejects every call.
    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn writes(&self) -> Vec<PersistenceWrite> {
        self.writes.lock().clone()
    }
}

impl Persistence for RecordingPersistence {
    fn write_file(&self, path: &str, payload: &[u8], mode: WriteMode, close_delay_us: u64) -> bool {
        if self.fail {
            return false;
        }
        self.writes.lock().push(PersistenceWrite::File {
            path: path.to_string(),
            payload: payload.to_vec(),
            mode,
            close_delay_us,
        });
        true
    }

    fn write_socket(&self, address: &str, payload: &[u8]) -> bool {
        if self.fail {
            return false;
        }
        self.writes.lock().push(PersistenceWrite::Socket {
            address: address.to_string(),
            payload: payload.to_vec(),
        });
        true
    }
}
