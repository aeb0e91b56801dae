mod message_service;
mod user_service;

pub use message_service::{
    CreateMessageRequest, MessageService, MessageServiceDependencies, DEFAULT_HISTORY_LIMIT,
    MAX_HISTORY_LIMIT,
};
pub use user_service::{
    AuthenticateUserRequest, ChangePasswordRequest, RegisterUserRequest, UpdateProfileRequest,
    UserService, UserServiceDependencies,
};

#[cfg(test)]
pub(crate) mod test_support;
