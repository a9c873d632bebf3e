//! `/pairings` management: add, remove and list controllers.
//!
//! Only reachable on a verified connection, and only by an admin.

use hap_core::{BridgeStatus, PairingError, PairingRecord, Permissions};
use hap_crypto::{Tlv8, TlvType};
use tracing::{debug, info, warn};

use crate::context::PairingContext;
use crate::fields;
use crate::registry::ConnectionId;

/// Pairing management method carried in the `Method` TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PairingMethod {
    AddPairing = 0x03,
    RemovePairing = 0x04,
    ListPairings = 0x05,
}

impl PairingMethod {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::AddPairing),
            0x04 => Some(Self::RemovePairing),
            0x05 => Some(Self::ListPairings),
            _ => None,
        }
    }
}

/// Response plus what the transport must do once it is written.
#[derive(Debug)]
pub struct PairingsOutcome {
    pub response: Tlv8,
    /// Close the requesting connection after writing the response.
    pub close_self: bool,
}

impl PairingsOutcome {
    fn reply(response: Tlv8) -> Self {
        Self {
            response,
            close_self: false,
        }
    }
}

/// Handle one `/pairings` request from the verified controller `requester`.
pub fn handle_pairings(
    request: &Tlv8,
    requester: &str,
    conn: ConnectionId,
    ctx: &PairingContext,
) -> PairingsOutcome {
    match dispatch(request, requester, conn, ctx) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%conn, peer = %requester, error = %e, "Pairings request rejected");
            PairingsOutcome::reply(Tlv8::error_response(2, e.tlv_code()))
        }
    }
}

fn dispatch(
    request: &Tlv8,
    requester: &str,
    conn: ConnectionId,
    ctx: &PairingContext,
) -> Result<PairingsOutcome, PairingError> {
    let state = request.state().unwrap_or(0);
    if state != 1 {
        return Err(PairingError::StateMismatch {
            expected: 1,
            actual: state,
        });
    }

    let raw_method = request
        .method()
        .ok_or(PairingError::MissingTlv(TlvType::Method as u8))?;
    let method =
        PairingMethod::from_byte(raw_method).ok_or(PairingError::UnsupportedMethod(raw_method))?;

    let is_admin = ctx
        .store()
        .get_pairing(requester)
        .map(|record| record.is_admin())
        .unwrap_or(false);
    if !is_admin {
        return Err(PairingError::NotAdmin);
    }

    match method {
        PairingMethod::AddPairing => add(request, ctx).map(PairingsOutcome::reply),
        PairingMethod::RemovePairing => remove(request, requester, conn, ctx),
        PairingMethod::ListPairings => Ok(PairingsOutcome::reply(list(ctx))),
    }
}

fn add(request: &Tlv8, ctx: &PairingContext) -> Result<Tlv8, PairingError> {
    let identifier = fields::text(request, TlvType::Identifier)?;
    let public_key = fields::public_key(request)?;
    let permissions = request.permissions().unwrap_or(Permissions::Regular);

    match ctx.store().get_pairing(identifier) {
        Some(existing) if existing.public_key != public_key => {
            return Err(PairingError::PublicKeyMismatch(identifier.to_string()));
        }
        Some(existing) if existing.permissions == permissions => {
            debug!(peer = %identifier, "Pairing already present");
            return Ok(Tlv8::state_only(2));
        }
        _ => {}
    }

    if !ctx
        .store()
        .save_pairing(PairingRecord::new(identifier, public_key, permissions))
    {
        return Err(PairingError::SaveRejected(identifier.to_string()));
    }
    info!(peer = %identifier, ?permissions, "Pairing added");
    Ok(Tlv8::state_only(2))
}

fn remove(
    request: &Tlv8,
    requester: &str,
    conn: ConnectionId,
    ctx: &PairingContext,
) -> Result<PairingsOutcome, PairingError> {
    let identifier = fields::text(request, TlvType::Identifier)?;

    ctx.store().remove_pairing(identifier);
    info!(peer = %identifier, "Pairing removed");

    let mut close_self = identifier == requester;
    if !close_self {
        ctx.registry().close(identifier);
    }

    let cleared = ctx.store().clear_pairings_if_no_admin();
    let admin_left = ctx.store().list_pairings().iter().any(PairingRecord::is_admin);
    if !admin_left {
        let closed = ctx.registry().close_all_except(conn);
        info!(cleared = cleared.len(), closed, "Last admin removed, bridge unpaired");
        ctx.store().set_bridge_status(BridgeStatus::Unpaired);
        ctx.advertiser().reload_service();
        close_self = true;
    }

    Ok(PairingsOutcome {
        response: Tlv8::state_only(2),
        close_self,
    })
}

fn list(ctx: &PairingContext) -> Tlv8 {
    let mut response = Tlv8::state_only(2);
    for (i, record) in ctx.store().list_pairings().iter().enumerate() {
        if i > 0 {
            response.push_separator();
        }
        response.push_str(TlvType::Identifier, record.identifier.clone());
        response.push_bytes(TlvType::PublicKey, record.public_key.to_vec());
        response.push_u8(TlvType::Permissions, record.permissions.as_byte());
    }
    response
}
