//! A live connection to one lamp

use std::time::Duration;

use sunset_proto::ble::CONTROL_UUID_U128;
use sunset_proto::{Brightness, CipherBox, Color, EncryptedFrame, Speed, encode_rgb_frame};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Transport, TransportError};

/// How long a connect attempt may take before it is abandoned
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("timed out connecting to {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: TransportError,
    },
}

/// Owns an open connection and turns colors into writes on it.
///
/// Call [`DeviceLink::close`] when done. A link that is dropped while still
/// open hands its connection back to the transport on a background task, so
/// the connection is released exactly once however the owner exits.
pub struct DeviceLink<T: Transport> {
    transport: T,
    conn: Option<T::Connection>,
    address: String,
    cipher: CipherBox,
    characteristic: Uuid,
}

impl<T: Transport> DeviceLink<T> {
    /// Connect to the lamp at `address`, giving up after `timeout`.
    ///
    /// The bound covers both opening the connection and discovering its
    /// services. A connection that opened but did not finish in time is
    /// closed before the error is returned.
    pub async fn connect(transport: T, address: &str, timeout: Duration) -> Result<Self, LinkError> {
        info!(%address, ?timeout, "connecting");
        let deadline = Instant::now() + timeout;
        let timed_out = || LinkError::Timeout { address: address.to_string(), timeout };
        let failed = |source| LinkError::Connect { address: address.to_string(), source };

        let conn = match tokio::time::timeout_at(deadline, transport.connect(address)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(source)) => return Err(failed(source)),
            Err(_) => return Err(timed_out()),
        };

        // From here on the link owns the connection, so it is released even
        // if this future is dropped.
        let link = Self {
            transport,
            conn: Some(conn),
            address: address.to_string(),
            cipher: CipherBox::new(),
            characteristic: Uuid::from_u128(CONTROL_UUID_U128),
        };

        let discovered = match link.conn.as_ref() {
            Some(conn) => tokio::time::timeout_at(deadline, link.transport.discover(conn)).await,
            None => Ok(Err(TransportError::Disconnected)),
        };
        let error = match discovered {
            Ok(Ok(())) => return Ok(link),
            Ok(Err(source)) => failed(source),
            Err(_) => timed_out(),
        };

        warn!(%address, "{error}, releasing connection");
        if let Err(e) = link.close().await {
            warn!(%address, "failed to release connection: {e}");
        }
        Err(error)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Encode, encrypt and write one RGB command. Returns the payload that
    /// went over the air. Failures are not retried.
    pub async fn send_color(
        &self,
        color: Color,
        brightness: Brightness,
        speed: Speed,
    ) -> Result<EncryptedFrame, TransportError> {
        let conn = self.conn.as_ref().ok_or(TransportError::Disconnected)?;

        let frame = encode_rgb_frame(color, brightness, speed);
        let payload = self.cipher.encrypt(&frame);
        debug!(%color, %brightness, %speed, payload = %payload.to_hex(), "sending");

        self.transport
            .write(conn, self.characteristic, payload.as_bytes())
            .await?;
        Ok(payload)
    }

    /// Release the connection
    pub async fn close(mut self) -> Result<(), TransportError> {
        match self.conn.take() {
            Some(conn) => {
                info!(address = %self.address, "closing");
                self.transport.close(conn).await
            }
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for DeviceLink<T> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let address = self.address.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%address, "link dropped while open, releasing in background");
                let transport = self.transport.clone();
                handle.spawn(async move {
                    if let Err(e) = transport.close(conn).await {
                        warn!(%address, "background release failed: {e}");
                    }
                });
            }
            Err(_) => warn!(%address, "link dropped outside a runtime, connection leaked"),
        }
    }
}
