pub mod http;
pub mod ws;

pub use http::{AuthClient, AuthUser, HttpClient, Provider};
pub use ws::WebSocketTransport;
