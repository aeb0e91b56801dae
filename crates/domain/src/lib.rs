//! 聊天中继系统核心领域模型
//!
//! 包含身份、用户、聊天消息以及中继进出事件的定义。

pub mod errors;
pub mod events;
pub mod identity;
pub mod message;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use identity::*;
pub use message::*;
pub use user::*;
pub use value_objects::*;
