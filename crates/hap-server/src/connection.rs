//! One accessory connection: read loop, decryption and request dispatch.

use std::sync::Arc;

use hap_core::{Error, Result, TransportError};
use hap_pairing::{ConnectionHandle, PairingContext, Session};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::http::{HttpRequest, HttpResponse};
use crate::router::{route, AccessoryHandler};

const READ_BUFFER_SIZE: usize = 4096;

/// Serve one connection until the peer hangs up, a fatal transport error
/// occurs, or the registry asks it to close.
///
/// The session is dropped on return, which releases the pair-setup gate or
/// unregisters the verified peer and wipes the traffic keys.
pub async fn serve_connection<S>(
    mut stream: S,
    handle: ConnectionHandle,
    ctx: Arc<PairingContext>,
    handler: Arc<dyn AccessoryHandler>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = handle.id();
    let mut session = Session::new(handle.clone(), ctx);
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            _ = handle.closed() => {
                info!(%conn, peer = ?session.peer_id(), "Connection closed by bridge");
                return Ok(());
            }
            read = stream.read(&mut buf) => read?,
        };
        if n == 0 {
            debug!(%conn, "Peer closed connection");
            return Ok(());
        }

        match session.decrypt(&buf[..n]) {
            Ok(Some(plaintext)) => pending.extend_from_slice(&plaintext),
            Ok(None) => continue,
            Err(e) => {
                warn!(%conn, error = %e, "Dropping connection");
                return Err(e.into());
            }
        }

        loop {
            let (request, used) = match HttpRequest::parse(&pending) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => {
                    warn!(%conn, error = %e, "Malformed request");
                    let reply = session.encrypt(&HttpResponse::new(400).to_bytes());
                    stream.write_all(&reply).await?;
                    return Err(e.into());
                }
            };
            pending.drain(..used);

            let routed = route(&mut session, handler.as_ref(), &request).await;
            let wire = session.encrypt(&routed.response.to_bytes());
            stream.write_all(&wire).await?;
            stream.flush().await?;

            if let Some(verified) = routed.verified {
                session.establish(verified);
                // anything already read past M3 was sent under the new keys
                let leftover = std::mem::take(&mut pending);
                if !leftover.is_empty() {
                    if let Some(plaintext) = session.decrypt(&leftover).map_err(Error::from)? {
                        pending = plaintext;
                    }
                }
            }

            if routed.close {
                debug!(%conn, "Closing after response");
                return Ok(());
            }
        }
    }
}

/// Map a connection result to a log line.
pub(crate) fn log_outcome(conn: hap_pairing::ConnectionId, result: &Result<()>) {
    match result {
        Ok(()) => debug!(%conn, "Connection finished"),
        Err(Error::Transport(TransportError::FrameCorrupted)) => {
            warn!(%conn, "Connection ended on corrupted frame")
        }
        Err(e) => debug!(%conn, error = %e, "Connection ended with error"),
    }
}
