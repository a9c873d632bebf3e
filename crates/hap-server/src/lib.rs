//! # hap-server
//!
//! TCP host for HomeKit bridge connections.
//!
//! Each accepted connection starts in plaintext and only reaches the
//! pairing endpoints. Once Pair-Verify completes, the frame codec wraps
//! the stream and requests for other paths go to an [`AccessoryHandler`].

pub mod advertise;
pub mod config;
pub mod connection;
pub mod http;
pub mod router;
pub mod server;

pub use advertise::{MdnsAdvertiser, ServiceRecord, HAP_SERVICE_TYPE};
pub use config::{BridgeConfig, BridgeConfigBuilder, DEFAULT_PORT};
pub use connection::serve_connection;
pub use http::{HttpRequest, HttpResponse};
pub use router::{AccessoryHandler, NotFoundHandler, Routed};
pub use server::BridgeServer;
