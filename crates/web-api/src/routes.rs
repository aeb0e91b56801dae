use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;
use validator::Validate;

use application::services::{
    AuthenticateUserRequest, ChangePasswordRequest, CreateMessageRequest, RegisterUserRequest,
    UpdateProfileRequest,
};
use domain::{Identity, MessageId, StoredMessage, User, UserId};

use crate::{
    auth::{AuthUser, TokenKind, TokenPair},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize, Validate)]
struct RegisterPayload {
    #[validate(length(min = 3, max = 20))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 6))]
    password: String,
    avatar: Option<String>,
}

/// `username` 字段也接受邮箱
#[derive(Debug, Deserialize, Validate)]
struct LoginPayload {
    #[validate(length(min = 1))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordPayload {
    current_password: String,
    #[validate(length(min = 6))]
    new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateUserPayload {
    #[validate(length(min = 3, max = 20))]
    username: Option<String>,
    #[validate(email)]
    email: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateMessagePayload {
    recipient_id: Option<Uuid>,
    #[validate(length(min = 1, max = 2000))]
    text: String,
    #[serde(default)]
    is_private: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    id: UserId,
    username: String,
    email: String,
    avatar: Option<String>,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.as_str().to_owned(),
            email: user.email.as_str().to_owned(),
            avatar: user.avatar,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user: UserDto,
    #[serde(flatten)]
    tokens: TokenPair,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/me", get(current_user))
        .route("/auth/change-password", post(change_password))
        .route("/auth/logout", post(logout))
        .route("/users", get(list_users))
        .route("/users/online", get(online_users))
        .route(
            "/users/{user_id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/messages", post(create_message))
        .route("/messages/public", get(public_history))
        .route(
            "/messages/private/{user_id}/{recipient_id}",
            get(private_history),
        )
        .route("/messages/{message_id}", delete(delete_message))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            avatar: payload.avatar,
        })
        .await?;

    let tokens = state.jwt_service.issue_pair(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user.into(),
            tokens,
        }),
    ))
}

async fn login_user(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.validate()?;
    let user = state
        .user_service
        .authenticate(AuthenticateUserRequest {
            login: payload.username,
            password: payload.password,
        })
        .await?;

    let tokens = state.jwt_service.issue_pair(&user)?;
    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<AuthResponse>, ApiError> {
    let claims = state
        .jwt_service
        .verify(&payload.refresh_token, TokenKind::Refresh)?;
    let user = state
        .user_service
        .get_active_user(UserId::from(claims.sub))
        .await?;

    let tokens = state.jwt_service.issue_pair(&user)?;
    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

async fn current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserDto>, ApiError> {
    let user = state.user_service.get_active_user(auth.user_id).await?;
    Ok(Json(user.into()))
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<StatusCode, ApiError> {
    payload.validate()?;
    state
        .user_service
        .change_password(
            auth.user_id,
            ChangePasswordRequest {
                current_password: payload.current_password,
                new_password: payload.new_password,
            },
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 令牌是无状态的，登出只需客户端丢弃令牌
async fn logout(auth: AuthUser) -> StatusCode {
    tracing::info!(user_id = %auth.user_id, username = %auth.username, "用户登出");
    StatusCode::NO_CONTENT
}

async fn list_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let users = state.user_service.list_users().await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserDto>, ApiError> {
    let user = state.user_service.get_user(UserId::from(user_id)).await?;
    Ok(Json(user.into()))
}

/// 只能修改自己的资料
async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<Json<UserDto>, ApiError> {
    let user_id = UserId::from(user_id);
    if user_id != auth.user_id {
        return Err(ApiError::forbidden("cannot modify another user"));
    }
    payload.validate()?;

    let user = state
        .user_service
        .update_profile(
            user_id,
            UpdateProfileRequest {
                username: payload.username,
                email: payload.email,
                avatar: payload.avatar,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = UserId::from(user_id);
    if user_id != auth.user_id {
        return Err(ApiError::forbidden("cannot delete another user"));
    }
    state.user_service.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 当前在线用户，多端登录只出现一次
async fn online_users(State(state): State<AppState>, _auth: AuthUser) -> Json<Vec<Identity>> {
    Json(state.relay.registry().online_users().await)
}

async fn create_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateMessagePayload>,
) -> Result<(StatusCode, Json<StoredMessage>), ApiError> {
    payload.validate()?;
    let stored = state
        .message_service
        .create_message(
            auth.user_id,
            CreateMessageRequest {
                text: payload.text,
                recipient_id: payload.recipient_id.map(UserId::from),
                is_private: payload.is_private,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn public_history(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let items = state.message_service.public_history(query.limit).await?;
    Ok(Json(items))
}

async fn private_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((user_id, recipient_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let items = state
        .message_service
        .private_history(
            auth.user_id,
            UserId::from(user_id),
            UserId::from(recipient_id),
            query.limit,
        )
        .await?;
    Ok(Json(items))
}

async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .message_service
        .delete_message(auth.user_id, MessageId::from(message_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 升级前校验访问令牌并加载账号，身份在此时绑定到连接
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let claims = match query.token {
        Some(token) => state.jwt_service.verify(&token, TokenKind::Access)?,
        None => state.jwt_service.extract_claims_from_headers(&headers)?,
    };
    let user = state
        .user_service
        .get_active_user(UserId::from(claims.sub))
        .await?;

    let connection = WebSocketConnection::new(state, user.identity());
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}
