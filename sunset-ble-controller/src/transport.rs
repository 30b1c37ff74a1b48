//! The seam between the lamp protocol and whatever carries bytes to it

use std::future::Future;

use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("not connected")]
    Disconnected,
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
    #[error("{0}")]
    Other(String),
}

/// A BLE central that can open a connection, write to a characteristic on
/// it, and close it again.
///
/// Implementations are cheap handles (`Clone`) so a connection can still be
/// released after its owner is gone. `connect` only opens the link; the slow
/// part (service discovery) goes in `discover`, so a caller that gives up
/// halfway already holds a connection it can close.
pub trait Transport: Clone + Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Make an open connection ready for writes
    fn discover(&self, conn: &Self::Connection) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn write(
        &self,
        conn: &Self::Connection,
        characteristic: Uuid,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn close(&self, conn: Self::Connection) -> impl Future<Output = Result<(), TransportError>> + Send;
}
