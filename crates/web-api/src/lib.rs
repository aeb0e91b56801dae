//! Web API 层。
//!
//! 提供 Axum 路由：账号、用户、历史消息的 HTTP 接口，以及承载实时中继的 WebSocket 传输。

mod auth;
mod error;
mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use auth::{AuthUser, Claims, JwtService, TokenKind, TokenPair};
pub use config::JwtConfig;
pub use error::{ApiError, ErrorBody};
pub use protocol::ClientFrame;
pub use routes::router;
pub use state::AppState;
