//! In-memory transport
//!
//! Records every write instead of sending it. Used for dry runs without a
//! lamp and as the test double for everything above [`crate::DeviceLink`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::{Transport, TransportError};

/// A write that reached the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub address: String,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    writes: Vec<RecordedWrite>,
    connects: usize,
    closes: usize,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    fail_discover: bool,
    discover_delay: Option<Duration>,
    fail_write_at: Option<usize>,
    write_attempts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub struct MemoryConnection {
    address: String,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every connect attempt fail
    pub fn fail_connect(&self) {
        self.lock().fail_connect = true;
    }

    /// Make connect attempts take `delay` before succeeding
    pub fn delay_connect(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Make service discovery fail after the connection is open
    pub fn fail_discovery(&self) {
        self.lock().fail_discover = true;
    }

    /// Make service discovery take `delay` after the connection is open
    pub fn delay_discovery(&self, delay: Duration) {
        self.lock().discover_delay = Some(delay);
    }

    /// Fail the write with this zero-based index, and every write after it
    pub fn fail_write_at(&self, index: usize) {
        self.lock().fail_write_at = Some(index);
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn connect(&self, address: &str) -> Result<MemoryConnection, TransportError> {
        let (fail, delay) = {
            let state = self.lock();
            (state.fail_connect, state.connect_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::DeviceNotFound(address.to_string()));
        }
        self.lock().connects += 1;
        Ok(MemoryConnection { address: address.to_string() })
    }

    async fn discover(&self, conn: &MemoryConnection) -> Result<(), TransportError> {
        let (fail, delay) = {
            let state = self.lock();
            (state.fail_discover, state.discover_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(TransportError::Other(format!("no services on {}", conn.address)));
        }
        Ok(())
    }

    async fn write(
        &self,
        conn: &MemoryConnection,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let attempt = state.write_attempts;
        state.write_attempts += 1;
        if state.fail_write_at.is_some_and(|index| attempt >= index) {
            return Err(TransportError::Other(format!("write {attempt} rejected")));
        }
        state.writes.push(RecordedWrite {
            address: conn.address.clone(),
            characteristic,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn close(&self, _conn: MemoryConnection) -> Result<(), TransportError> {
        self.lock().closes += 1;
        Ok(())
    }
}
