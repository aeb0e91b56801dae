//! 应用层实现。
//!
//! 这里是实时在线状态与消息中继的核心：在线注册表、中继引擎、
//! 出站投递路由和异步持久化队列，以及围绕账号和历史消息的用例服务。

pub mod clock;
pub mod delivery;
pub mod error;
pub mod password;
pub mod persistence;
pub mod presence;
pub mod relay;
pub mod repository;
pub mod services;

pub use clock::{Clock, SystemClock};
pub use delivery::{ConnectionRouter, DeliveryError, OutboundSink};
pub use error::ApplicationError;
pub use password::{PasswordHasher, PasswordHasherError};
pub use persistence::{PersistenceQueue, PersistenceReport};
pub use presence::PresenceRegistry;
pub use relay::{ConnectionState, RelayConnection, RelayEngine, RelayEngineDependencies, RelayError};
pub use repository::{MessageRepository, UserRepository};
pub use services::{
    MessageService, MessageServiceDependencies, UserService, UserServiceDependencies,
};
