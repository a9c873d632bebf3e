//! Per-connection pairing state.

use std::sync::Arc;

use hap_core::{TlvErrorCode, TransportError};
use hap_crypto::Tlv8;
use tracing::debug;

use crate::channel::FrameCodec;
use crate::context::PairingContext;
use crate::pair_setup::PairSetup;
use crate::pair_verify::{PairVerify, VerifiedSession, VerifyStep};
use crate::pairings::{handle_pairings, PairingsOutcome};
use crate::registry::{ConnectionHandle, ConnectionId};

/// Where a connection is in its life: handshaking, or keyed.
pub enum ConnectionState {
    Unauthenticated { setup: PairSetup, verify: PairVerify },
    Established { peer_id: String, codec: FrameCodec },
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Unauthenticated {
            setup: PairSetup::new(),
            verify: PairVerify::new(),
        }
    }
}

/// Pairing state owned by one connection.
///
/// Dropping the session releases the pair-setup gate, unregisters a verified
/// peer, and wipes every key it holds.
pub struct Session {
    handle: ConnectionHandle,
    ctx: Arc<PairingContext>,
    state: ConnectionState,
}

impl Session {
    pub fn new(handle: ConnectionHandle, ctx: Arc<PairingContext>) -> Self {
        Self {
            handle,
            ctx,
            state: ConnectionState::default(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.state, ConnectionState::Established { .. })
    }

    pub fn peer_id(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Established { peer_id, .. } => Some(peer_id),
            ConnectionState::Unauthenticated { .. } => None,
        }
    }

    /// Handle a `/pair-setup` body.
    pub fn pair_setup(&mut self, body: &[u8]) -> Tlv8 {
        let request = Tlv8::parse(body);
        match &mut self.state {
            ConnectionState::Unauthenticated { setup, .. } => {
                setup.handle(&request, self.handle.id(), &self.ctx)
            }
            ConnectionState::Established { .. } => {
                let state = request.state().unwrap_or(0);
                Tlv8::error_response(state.wrapping_add(1), TlvErrorCode::Unavailable)
            }
        }
    }

    /// Handle a `/pair-verify` body.
    ///
    /// On success the returned step carries the verified session; pass it to
    /// [`establish`](Self::establish) after the plaintext response is written.
    pub fn pair_verify(&mut self, body: &[u8]) -> VerifyStep {
        let request = Tlv8::parse(body);
        match &mut self.state {
            ConnectionState::Unauthenticated { verify, .. } => {
                verify.handle(&request, &self.handle, &self.ctx)
            }
            ConnectionState::Established { .. } => {
                let state = request.state().unwrap_or(0);
                VerifyStep {
                    response: Tlv8::error_response(state.wrapping_add(1), TlvErrorCode::Unknown),
                    session: None,
                }
            }
        }
    }

    /// Switch to the keyed state; later bytes go through the frame codec.
    ///
    /// The peer is registered here, so a connection lost between M4 and this
    /// call leaves nothing behind in the registry.
    pub fn establish(&mut self, verified: VerifiedSession) {
        if let ConnectionState::Unauthenticated { setup, .. } = &mut self.state {
            setup.abort(self.handle.id(), &self.ctx);
        }
        self.ctx.registry().register(&verified.peer_id, self.handle.clone());
        debug!(conn = %self.handle.id(), peer = %verified.peer_id, "Installing frame codec");
        self.state = ConnectionState::Established {
            codec: FrameCodec::new(&verified.keys),
            peer_id: verified.peer_id,
        };
    }

    /// Handle a `/pairings` body. `None` if the connection is not verified.
    pub fn pairings(&mut self, body: &[u8]) -> Option<PairingsOutcome> {
        let peer_id = self.peer_id()?;
        let request = Tlv8::parse(body);
        Some(handle_pairings(&request, peer_id, self.handle.id(), &self.ctx))
    }

    /// Bytes to put on the wire for `plaintext`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        match &mut self.state {
            ConnectionState::Established { codec, .. } => codec.encrypt(plaintext),
            ConnectionState::Unauthenticated { .. } => plaintext.to_vec(),
        }
    }

    /// Plaintext for bytes read from the wire, once available.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        match &mut self.state {
            ConnectionState::Established { codec, .. } => codec.decrypt(data),
            ConnectionState::Unauthenticated { .. } if data.is_empty() => Ok(None),
            ConnectionState::Unauthenticated { .. } => Ok(Some(data.to_vec())),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let conn = self.handle.id();
        match &mut self.state {
            ConnectionState::Unauthenticated { setup, .. } => setup.abort(conn, &self.ctx),
            ConnectionState::Established { peer_id, .. } => {
                if self.ctx.registry().unregister(peer_id, conn) {
                    debug!(%conn, peer = %peer_id, "Session closed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerIdentity, VerifyClient};
    use crate::test_support;
    use crate::traits::PairingStore;
    use hap_crypto::TlvType;

    fn verified_session(
        ctx: &Arc<PairingContext>,
        id: u64,
    ) -> (Session, FrameCodec, ControllerIdentity) {
        let controller = ControllerIdentity::generate();
        let accessory = test_support::pair_controller(ctx, &controller);
        let mut client = VerifyClient::new(controller.clone(), accessory.public_key);
        let mut session = Session::new(ConnectionHandle::new(ConnectionId(id)), ctx.clone());

        let m2 = session.pair_verify(&client.m1().encode());
        let m3 = client.handle_m2(&m2.response).unwrap();
        let m4 = session.pair_verify(&m3.encode());
        let keys = client.handle_m4(&m4.response).unwrap();
        session.establish(m4.session.unwrap());

        (session, FrameCodec::new(&keys), controller)
    }

    #[test]
    fn starts_unauthenticated_with_passthrough() {
        let (_store, ctx) = test_support::memory_context();
        let mut session = Session::new(ConnectionHandle::new(ConnectionId(1)), Arc::new(ctx));

        assert!(!session.is_verified());
        assert!(session.peer_id().is_none());
        assert_eq!(session.encrypt(b"plain"), b"plain");
        assert_eq!(session.decrypt(b"plain").unwrap().unwrap(), b"plain");
        assert!(session.pairings(&[]).is_none());
    }

    #[test]
    fn established_session_encrypts_both_ways() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (mut session, mut controller_codec, controller) = verified_session(&ctx, 3);

        assert!(session.is_verified());
        assert_eq!(session.peer_id(), Some(controller.id()));

        let request = controller_codec.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n");
        let plain = session.decrypt(&request).unwrap().unwrap();
        assert_eq!(plain, b"GET /accessories HTTP/1.1\r\n\r\n");

        let response = session.encrypt(b"HTTP/1.1 200 OK\r\n\r\n");
        assert_ne!(response, b"HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(
            controller_codec.decrypt(&response).unwrap().unwrap(),
            b"HTTP/1.1 200 OK\r\n\r\n"
        );
    }

    #[test]
    fn pair_setup_after_verify_is_unavailable() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (mut session, _, _) = verified_session(&ctx, 3);

        let response = session.pair_setup(&Tlv8::state_only(1).encode());
        assert_eq!(response.state(), Some(2));
        assert_eq!(response.error_code(), Some(TlvErrorCode::Unavailable));
    }

    #[test]
    fn verified_admin_can_list_pairings() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (mut session, _, controller) = verified_session(&ctx, 3);

        let request = Tlv8::state_only(1).with_u8(TlvType::Method, 0x05);
        let outcome = session.pairings(&request.encode()).unwrap();
        assert_eq!(outcome.response.get_str(TlvType::Identifier), Some(controller.id()));
    }

    #[test]
    fn drop_unregisters_peer() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (session, _, controller) = verified_session(&ctx, 3);
        assert!(ctx.registry().is_registered(controller.id()));

        drop(session);
        assert!(!ctx.registry().is_registered(controller.id()));
    }

    #[test]
    fn drop_keeps_newer_registration() {
        let (store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (session, _, controller) = verified_session(&ctx, 3);

        // same controller verifies again on another connection
        let accessory_key = store.bridge_identity().public_key();
        let mut client = VerifyClient::new(controller.clone(), accessory_key);
        let mut newer = Session::new(ConnectionHandle::new(ConnectionId(4)), ctx.clone());
        let m2 = newer.pair_verify(&client.m1().encode());
        let m3 = client.handle_m2(&m2.response).unwrap();
        let m4 = newer.pair_verify(&m3.encode());
        newer.establish(m4.session.unwrap());

        drop(session);
        assert_eq!(ctx.registry().connection_for(controller.id()), Some(ConnectionId(4)));
    }

    #[test]
    fn drop_before_establish_leaves_no_registration() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let controller = ControllerIdentity::generate();
        let accessory = test_support::pair_controller(&ctx, &controller);
        let mut client = VerifyClient::new(controller.clone(), accessory.public_key);
        let mut session = Session::new(ConnectionHandle::new(ConnectionId(6)), ctx.clone());

        let m2 = session.pair_verify(&client.m1().encode());
        let m3 = client.handle_m2(&m2.response).unwrap();
        let m4 = session.pair_verify(&m3.encode());
        assert!(m4.session.is_some());
        assert!(!session.is_verified());

        // connection lost before the M4 response went out
        drop(session);
        assert!(!ctx.registry().is_registered(controller.id()));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn establish_registers_peer() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let (_session, _, controller) = verified_session(&ctx, 8);

        assert_eq!(ctx.registry().connection_for(controller.id()), Some(ConnectionId(8)));
    }

    #[test]
    fn drop_releases_setup_gate() {
        let (_store, ctx) = test_support::memory_context();
        let ctx = Arc::new(ctx);
        let mut session = Session::new(ConnectionHandle::new(ConnectionId(1)), ctx.clone());
        session.pair_setup(&Tlv8::state_only(1).with_u8(TlvType::Method, 0).encode());
        assert_eq!(ctx.gate().owner(), Some(ConnectionId(1)));

        drop(session);
        assert!(ctx.gate().owner().is_none());
    }
}
