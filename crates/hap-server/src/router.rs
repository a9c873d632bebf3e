//! Request routing for one connection.

use async_trait::async_trait;
use hap_core::{HapStatus, TlvErrorCode};
use hap_crypto::Tlv8;
use hap_pairing::{Session, VerifiedSession};
use tracing::{debug, warn};

use crate::http::{HttpRequest, HttpResponse, CONTENT_TYPE_TLV8};

pub const PATH_PAIR_SETUP: &str = "/pair-setup";
pub const PATH_PAIR_VERIFY: &str = "/pair-verify";
pub const PATH_PAIRINGS: &str = "/pairings";

/// Handler for the accessory endpoints (`/accessories`, `/characteristics`, ...).
///
/// Only called for connections that completed Pair-Verify.
#[async_trait]
pub trait AccessoryHandler: Send + Sync {
    async fn handle(&self, peer_id: &str, request: &HttpRequest) -> HttpResponse;
}

/// Answers every accessory request with 404.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFoundHandler;

#[async_trait]
impl AccessoryHandler for NotFoundHandler {
    async fn handle(&self, _peer_id: &str, _request: &HttpRequest) -> HttpResponse {
        HttpResponse::new(404)
    }
}

/// What the connection loop must do with a routed request.
pub struct Routed {
    pub response: HttpResponse,
    /// Install the frame codec after the response is written.
    pub verified: Option<VerifiedSession>,
    /// Close the connection after the response is written.
    pub close: bool,
}

impl Routed {
    fn reply(response: HttpResponse) -> Self {
        Self {
            response,
            verified: None,
            close: false,
        }
    }
}

/// Dispatch one request against the connection's session.
pub async fn route(
    session: &mut Session,
    handler: &dyn AccessoryHandler,
    request: &HttpRequest,
) -> Routed {
    let conn = session.id();
    debug!(%conn, method = %request.method, path = %request.path, "Request");

    match request.path.as_str() {
        PATH_PAIR_SETUP | PATH_PAIR_VERIFY | PATH_PAIRINGS => {
            if let Some(rejected) = pairing_gate(request) {
                warn!(
                    %conn,
                    path = %request.path,
                    status = rejected.status,
                    "Rejected pairing request"
                );
                return Routed::reply(rejected);
            }
        }
        _ => {}
    }

    match request.path.as_str() {
        PATH_PAIR_SETUP => {
            let response = session.pair_setup(&request.body);
            Routed::reply(HttpResponse::tlv8(response.encode()))
        }
        PATH_PAIR_VERIFY => {
            let step = session.pair_verify(&request.body);
            Routed {
                response: HttpResponse::tlv8(step.response.encode()),
                verified: step.session,
                close: false,
            }
        }
        PATH_PAIRINGS => match session.pairings(&request.body) {
            Some(outcome) => Routed {
                response: HttpResponse::tlv8(outcome.response.encode()),
                verified: None,
                close: outcome.close_self,
            },
            None => {
                warn!(%conn, "Pairings request on unverified connection");
                let body = Tlv8::error_response(2, TlvErrorCode::Authentication).encode();
                Routed::reply(HttpResponse::new(470).with_body(CONTENT_TYPE_TLV8, body))
            }
        },
        _ => match session.peer_id() {
            Some(peer_id) => Routed::reply(handler.handle(peer_id, request).await),
            None => {
                debug!(%conn, path = %request.path, "Accessory request before pair-verify");
                Routed::reply(HttpResponse::json(
                    470,
                    &serde_json::json!({ "status": HapStatus::InsufficientAuthorization.code() }),
                ))
            }
        },
    }
}

/// Method and content-type checks shared by the pairing endpoints.
fn pairing_gate(request: &HttpRequest) -> Option<HttpResponse> {
    if request.method != "POST" {
        return Some(HttpResponse::new(405).with_header("Allow", "POST"));
    }
    if request.content_type() != Some(CONTENT_TYPE_TLV8) {
        return Some(HttpResponse::new(400));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use hap_crypto::TlvType;
    use hap_pairing::{
        ConnectionHandle, ConnectionId, ControllerIdentity, MemoryPairingStore, NoopAdvertiser,
        PairingContext, SessionRegistry, SetupClient, VerifyClient,
    };

    const SETUP_CODE: &str = "031-45-154";

    fn context() -> Arc<PairingContext> {
        Arc::new(PairingContext::new(
            Arc::new(MemoryPairingStore::new("0E:00:00:00:00:01")),
            Arc::new(NoopAdvertiser),
            Arc::new(SessionRegistry::new()),
            SETUP_CODE,
        ))
    }

    fn session(ctx: &Arc<PairingContext>, id: u64) -> Session {
        Session::new(ConnectionHandle::new(ConnectionId(id)), ctx.clone())
    }

    fn request(method: &str, path: &str, content_type: Option<&str>, body: Vec<u8>) -> HttpRequest {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("Content-Type".to_string(), ct.to_string());
        }
        headers.insert("Content-Length".to_string(), body.len().to_string());
        HttpRequest {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers,
            body,
        }
    }

    fn tlv_post(path: &str, tlv: &Tlv8) -> HttpRequest {
        request("POST", path, Some(CONTENT_TYPE_TLV8), tlv.encode())
    }

    async fn routed_tlv(session: &mut Session, path: &str, tlv: &Tlv8) -> Routed {
        route(session, &NotFoundHandler, &tlv_post(path, tlv)).await
    }

    async fn verified(ctx: &Arc<PairingContext>, id: u64) -> Session {
        let controller = ControllerIdentity::generate();

        let mut setup_session = session(ctx, id + 1000);
        let mut client = SetupClient::new(SETUP_CODE, controller.clone());
        let m2 = routed_tlv(&mut setup_session, PATH_PAIR_SETUP, &client.m1()).await;
        let m3 = client.handle_m2(&Tlv8::parse(&m2.response.body)).unwrap();
        let m4 = routed_tlv(&mut setup_session, PATH_PAIR_SETUP, &m3).await;
        let m5 = client.handle_m4(&Tlv8::parse(&m4.response.body)).unwrap();
        let m6 = routed_tlv(&mut setup_session, PATH_PAIR_SETUP, &m5).await;
        let accessory = client.handle_m6(&Tlv8::parse(&m6.response.body)).unwrap();

        let mut s = session(ctx, id);
        let mut client = VerifyClient::new(controller, accessory.public_key);
        let m2 = routed_tlv(&mut s, PATH_PAIR_VERIFY, &client.m1()).await;
        assert!(m2.verified.is_none());
        let m3 = client.handle_m2(&Tlv8::parse(&m2.response.body)).unwrap();
        let m4 = routed_tlv(&mut s, PATH_PAIR_VERIFY, &m3).await;
        s.establish(m4.verified.expect("verify should complete"));
        s
    }

    mod gate {
        use super::*;

        #[tokio::test]
        async fn get_on_pairing_path_is_405() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let req = request("GET", PATH_PAIR_SETUP, None, vec![]);
            let routed = route(&mut s, &NotFoundHandler, &req).await;
            assert_eq!(routed.response.status, 405);
            assert_eq!(routed.response.header("Allow"), Some("POST"));
            assert!(ctx.gate().owner().is_none());
        }

        #[tokio::test]
        async fn wrong_content_type_is_400() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let body = Tlv8::state_only(1).encode();
            let req = request("POST", PATH_PAIR_VERIFY, Some("application/json"), body);
            let routed = route(&mut s, &NotFoundHandler, &req).await;
            assert_eq!(routed.response.status, 400);
        }

        #[tokio::test]
        async fn content_type_parameters_are_ignored() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let body = Tlv8::state_only(1).with_u8(TlvType::Method, 0).encode();
            let content_type = Some("application/pairing+tlv8; charset=binary");
            let req = request("POST", PATH_PAIR_SETUP, content_type, body);
            let routed = route(&mut s, &NotFoundHandler, &req).await;
            assert_eq!(routed.response.status, 200);
        }
    }

    mod unverified {
        use super::*;

        #[tokio::test]
        async fn pairings_is_470_with_tlv_error() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let list = Tlv8::state_only(1).with_u8(TlvType::Method, 0x05);
            let routed = routed_tlv(&mut s, PATH_PAIRINGS, &list).await;

            assert_eq!(routed.response.status, 470);
            let tlv = Tlv8::parse(&routed.response.body);
            assert_eq!(tlv.state(), Some(2));
            assert_eq!(tlv.error_code(), Some(TlvErrorCode::Authentication));
        }

        #[tokio::test]
        async fn accessory_path_is_470_json() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let req = request("GET", "/accessories", None, vec![]);
            let routed = route(&mut s, &NotFoundHandler, &req).await;

            assert_eq!(routed.response.status, 470);
            assert_eq!(routed.response.reason, "Connection Authorization Required");
            let json: serde_json::Value = serde_json::from_slice(&routed.response.body).unwrap();
            assert_eq!(json["status"], -70411);
        }

        #[tokio::test]
        async fn pair_setup_m1_answers_m2() {
            let ctx = context();
            let mut s = session(&ctx, 1);
            let m1 = Tlv8::state_only(1).with_u8(TlvType::Method, 0);
            let routed = routed_tlv(&mut s, PATH_PAIR_SETUP, &m1).await;

            assert_eq!(routed.response.status, 200);
            assert_eq!(routed.response.header("Content-Type"), Some(CONTENT_TYPE_TLV8));
            let tlv = Tlv8::parse(&routed.response.body);
            assert_eq!(tlv.state(), Some(2));
            assert!(tlv.get_bytes(TlvType::Salt).is_some());
            assert!(!routed.close);
        }
    }

    mod verified {
        use super::*;

        struct Echo;

        #[async_trait]
        impl AccessoryHandler for Echo {
            async fn handle(&self, peer_id: &str, request: &HttpRequest) -> HttpResponse {
                let body = format!("{} {}", peer_id, request.path);
                HttpResponse::ok().with_body("text/plain", body.into_bytes())
            }
        }

        #[tokio::test]
        async fn accessory_path_goes_to_handler() {
            let ctx = context();
            let mut s = verified(&ctx, 1).await;
            let peer = s.peer_id().unwrap().to_string();

            let routed = route(&mut s, &Echo, &request("GET", "/accessories", None, vec![])).await;
            assert_eq!(routed.response.status, 200);
            assert_eq!(routed.response.body, format!("{} /accessories", peer).into_bytes());
        }

        #[tokio::test]
        async fn default_handler_is_404() {
            let ctx = context();
            let mut s = verified(&ctx, 1).await;
            let req = request("GET", "/characteristics", None, vec![]);
            let routed = route(&mut s, &NotFoundHandler, &req).await;
            assert_eq!(routed.response.status, 404);
        }

        #[tokio::test]
        async fn removing_self_requests_close() {
            let ctx = context();
            let mut s = verified(&ctx, 1).await;
            let peer = s.peer_id().unwrap().to_string();

            let remove = Tlv8::state_only(1)
                .with_u8(TlvType::Method, 0x04)
                .with_str(TlvType::Identifier, &peer);
            let routed = routed_tlv(&mut s, PATH_PAIRINGS, &remove).await;

            assert_eq!(routed.response.status, 200);
            assert!(routed.close);
            assert_eq!(Tlv8::parse(&routed.response.body).state(), Some(2));
        }
    }
}
