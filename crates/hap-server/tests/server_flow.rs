//! End-to-end bridge tests over loopback TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hap_core::TlvErrorCode;
use hap_crypto::{Tlv8, TlvType};
use hap_pairing::{AccessoryInfo, ControllerIdentity, FrameCodec, SetupClient, VerifyClient};
use hap_server::{AccessoryHandler, BridgeConfig, BridgeServer, HttpRequest, HttpResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

const SETUP_CODE: &str = "031-45-154";

struct Response {
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Controller end of one TCP connection.
struct Peer {
    stream: TcpStream,
    codec: Option<FrameCodec>,
    pending: Vec<u8>,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            codec: None,
            pending: Vec::new(),
        }
    }

    async fn send(
        &mut self,
        method: &str,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Response {
        let mut request = format!("{} {} HTTP/1.1\r\nHost: bridge\r\n", method, path);
        if let Some(ct) = content_type {
            request.push_str(&format!("Content-Type: {}\r\n", ct));
        }
        request.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
        let mut bytes = request.into_bytes();
        bytes.extend_from_slice(body);

        let wire = match &mut self.codec {
            Some(codec) => codec.encrypt(&bytes),
            None => bytes,
        };
        self.stream.write_all(&wire).await.unwrap();
        self.read_response().await
    }

    async fn tlv(&mut self, path: &str, tlv: &Tlv8) -> Tlv8 {
        let response = self
            .send("POST", path, Some("application/pairing+tlv8"), &tlv.encode())
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/pairing+tlv8"));
        Tlv8::parse(&response.body)
    }

    async fn read_response(&mut self) -> Response {
        let mut buf = [0u8; 2048];
        loop {
            if let Some(response) = self.take_response() {
                return response;
            }
            let n = timeout(Duration::from_secs(5), self.stream.read(&mut buf))
                .await
                .expect("response timed out")
                .unwrap();
            assert!(n > 0, "bridge closed the connection");
            let plain = match &mut self.codec {
                Some(codec) => codec.decrypt(&buf[..n]).unwrap().unwrap_or_default(),
                None => buf[..n].to_vec(),
            };
            self.pending.extend_from_slice(&plain);
        }
    }

    fn take_response(&mut self) -> Option<Response> {
        let end = self.pending.windows(4).position(|w| w == b"\r\n\r\n")?;
        let head = String::from_utf8(self.pending[..end].to_vec()).unwrap();
        let mut lines = head.split("\r\n");
        let status = lines.next().unwrap()[9..12].parse().unwrap();

        let mut length = 0;
        let mut content_type = None;
        for line in lines {
            let (name, value) = line.split_once(": ").unwrap();
            match name {
                "Content-Length" => length = value.parse().unwrap(),
                "Content-Type" => content_type = Some(value.to_string()),
                _ => {}
            }
        }
        if self.pending.len() < end + 4 + length {
            return None;
        }
        let body = self.pending[end + 4..end + 4 + length].to_vec();
        self.pending.drain(..end + 4 + length);
        Some(Response {
            status,
            content_type,
            body,
        })
    }

    /// True once the bridge has closed its end.
    async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 64];
        matches!(
            timeout(Duration::from_secs(5), self.stream.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    async fn pair_setup(&mut self, controller: &ControllerIdentity) -> AccessoryInfo {
        let mut client = SetupClient::new(SETUP_CODE, controller.clone());
        let m2 = self.tlv("/pair-setup", &client.m1()).await;
        let m3 = client.handle_m2(&m2).unwrap();
        let m4 = self.tlv("/pair-setup", &m3).await;
        let m5 = client.handle_m4(&m4).unwrap();
        let m6 = self.tlv("/pair-setup", &m5).await;
        client.handle_m6(&m6).unwrap()
    }

    async fn pair_verify(&mut self, controller: &ControllerIdentity, accessory: &AccessoryInfo) {
        let mut client = VerifyClient::new(controller.clone(), accessory.public_key);
        let m2 = self.tlv("/pair-verify", &client.m1()).await;
        let m3 = client.handle_m2(&m2).unwrap();
        let m4 = self.tlv("/pair-verify", &m3).await;
        let keys = client.handle_m4(&m4).unwrap();
        self.codec = Some(FrameCodec::new(&keys));
    }
}

struct Accessories;

#[async_trait]
impl AccessoryHandler for Accessories {
    async fn handle(&self, peer_id: &str, request: &HttpRequest) -> HttpResponse {
        match request.path.as_str() {
            "/accessories" => HttpResponse::json(
                200,
                &serde_json::json!({ "accessories": [], "peer": peer_id, "pad": "x".repeat(3000) }),
            ),
            _ => HttpResponse::new(404),
        }
    }
}

struct Bridge {
    addr: SocketAddr,
    server: Arc<BridgeServer>,
    stop: Option<oneshot::Sender<()>>,
}

impl Bridge {
    async fn start() -> Self {
        let config = BridgeConfig::builder()
            .name("Test Bridge")
            .setup_code(SETUP_CODE)
            .pairing_id("0E:12:34:56:78:9A")
            .bind_address([127, 0, 0, 1].into())
            .port(0)
            .advertise(false)
            .build()
            .unwrap();
        let server = BridgeServer::new(config)
            .unwrap()
            .with_handler(Arc::new(Accessories));
        let server = Arc::new(server);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let serving = server.clone();
        tokio::spawn(async move {
            serving
                .serve(listener, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            server,
            stop: Some(stop),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[tokio::test]
async fn pair_verify_then_encrypted_accessory_request() {
    let bridge = Bridge::start().await;
    let controller = ControllerIdentity::generate();

    let mut setup = Peer::connect(bridge.addr).await;
    let accessory = setup.pair_setup(&controller).await;
    assert_eq!(accessory.pairing_id, "0E:12:34:56:78:9A");
    assert!(bridge.server.context().store().bridge_identity().is_paired());

    let mut peer = Peer::connect(bridge.addr).await;
    peer.pair_verify(&controller, &accessory).await;

    let response = peer.send("GET", "/accessories", None, &[]).await;
    assert_eq!(response.status, 200);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["peer"], controller.id());

    let response = peer.send("GET", "/characteristics?id=1.9", None, &[]).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn unverified_connection_gets_470() {
    let bridge = Bridge::start().await;
    let mut peer = Peer::connect(bridge.addr).await;

    let response = peer.send("GET", "/accessories", None, &[]).await;
    assert_eq!(response.status, 470);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["status"], -70411);

    let list = Tlv8::state_only(1).with_u8(TlvType::Method, 0x05);
    let response = peer
        .send("POST", "/pairings", Some("application/pairing+tlv8"), &list.encode())
        .await;
    assert_eq!(response.status, 470);
    assert_eq!(
        Tlv8::parse(&response.body).error_code(),
        Some(TlvErrorCode::Authentication)
    );
}

#[tokio::test]
async fn pairing_paths_check_method_and_content_type() {
    let bridge = Bridge::start().await;
    let mut peer = Peer::connect(bridge.addr).await;

    let response = peer.send("GET", "/pair-setup", None, &[]).await;
    assert_eq!(response.status, 405);

    let body = Tlv8::state_only(1).with_u8(TlvType::Method, 0).encode();
    let response = peer.send("POST", "/pair-setup", Some("application/json"), &body).await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn second_connection_is_busy_during_setup() {
    let bridge = Bridge::start().await;
    let m1 = Tlv8::state_only(1).with_u8(TlvType::Method, 0);

    let mut first = Peer::connect(bridge.addr).await;
    let m2 = first.tlv("/pair-setup", &m1).await;
    assert!(m2.error().is_none());

    let mut second = Peer::connect(bridge.addr).await;
    let m2 = second.tlv("/pair-setup", &m1).await;
    assert_eq!(m2.error_code(), Some(TlvErrorCode::Busy));

    // the gate frees once the owner goes away
    drop(first);
    let mut third = None;
    for _ in 0..50 {
        let mut peer = Peer::connect(bridge.addr).await;
        let m2 = peer.tlv("/pair-setup", &m1).await;
        if m2.error().is_none() {
            third = Some(m2);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(third.and_then(|m2| m2.state()), Some(2));
}

#[tokio::test]
async fn removing_pairing_closes_its_connection() {
    let bridge = Bridge::start().await;
    let admin = ControllerIdentity::generate();
    let guest = ControllerIdentity::generate();

    let accessory = Peer::connect(bridge.addr).await.pair_setup(&admin).await;

    let mut admin_peer = Peer::connect(bridge.addr).await;
    admin_peer.pair_verify(&admin, &accessory).await;

    let add = Tlv8::state_only(1)
        .with_u8(TlvType::Method, 0x03)
        .with_str(TlvType::Identifier, guest.id())
        .with_bytes(TlvType::PublicKey, guest.public_key().to_vec())
        .with_u8(TlvType::Permissions, 0x00);
    let response = admin_peer.tlv("/pairings", &add).await;
    assert!(response.error().is_none());

    let mut guest_peer = Peer::connect(bridge.addr).await;
    guest_peer.pair_verify(&guest, &accessory).await;
    assert_eq!(guest_peer.send("GET", "/accessories", None, &[]).await.status, 200);

    let remove = Tlv8::state_only(1)
        .with_u8(TlvType::Method, 0x04)
        .with_str(TlvType::Identifier, guest.id());
    let response = admin_peer.tlv("/pairings", &remove).await;
    assert!(response.error().is_none());

    assert!(guest_peer.is_closed().await);
    assert!(bridge.server.context().store().get_pairing(guest.id()).is_none());
}

#[tokio::test]
async fn corrupted_frame_drops_connection() {
    let bridge = Bridge::start().await;
    let controller = ControllerIdentity::generate();
    let accessory = Peer::connect(bridge.addr).await.pair_setup(&controller).await;

    let mut peer = Peer::connect(bridge.addr).await;
    peer.pair_verify(&controller, &accessory).await;

    let mut frame = peer
        .codec
        .as_mut()
        .unwrap()
        .encrypt(b"GET /accessories HTTP/1.1\r\n\r\n");
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    peer.stream.write_all(&frame).await.unwrap();

    assert!(peer.is_closed().await);
    assert!(!bridge.server.context().registry().is_registered(controller.id()));
}
