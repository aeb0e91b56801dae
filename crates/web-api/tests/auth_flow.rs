mod support;

use reqwest::StatusCode;
use serde_json::{json, Value};

use support::{session_from, spawn_app};

#[tokio::test]
async fn register_login_refresh_and_me() {
    let app = spawn_app().await;
    let alice = app.register("alice").await;

    let me: Value = app
        .get("/api/auth/me", &alice.access_token)
        .await
        .json()
        .await
        .expect("me json");
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], "alice@example.com");
    assert!(me.get("password").is_none());

    let login = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "alice@example.com", "password": "secret123" }))
        .send()
        .await
        .expect("login");
    assert_eq!(login.status(), StatusCode::OK);
    let body: Value = login.json().await.expect("login json");
    assert_eq!(body["tokenType"], "Bearer");
    assert!(body["user"]["lastLoginAt"].is_string());

    let refreshed = app
        .client
        .post(app.url("/api/auth/refresh"))
        .json(&json!({ "refreshToken": alice.refresh_token }))
        .send()
        .await
        .expect("refresh");
    assert_eq!(refreshed.status(), StatusCode::OK);
    let session = session_from(&refreshed.json::<Value>().await.expect("refresh json"));
    assert_eq!(session.user_id, alice.user_id);

    // 访问令牌不能当刷新令牌用
    let misuse = app
        .client
        .post(app.url("/api/auth/refresh"))
        .json(&json!({ "refreshToken": alice.access_token }))
        .send()
        .await
        .expect("refresh with access token");
    assert_eq!(misuse.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_conflicts_and_validation() {
    let app = spawn_app().await;
    app.register("alice").await;

    let duplicate = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "username": "alice",
            "email": "another@example.com",
            "password": "secret123"
        }))
        .send()
        .await
        .expect("duplicate");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    let body: Value = duplicate.json().await.expect("error json");
    assert_eq!(body["code"], "USER_EXISTS");

    let invalid = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({
            "username": "zed",
            "email": "not-an-email",
            "password": "123"
        }))
        .send()
        .await
        .expect("invalid");
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_credentials_and_missing_token_are_unauthorized() {
    let app = spawn_app().await;
    app.register("alice").await;

    let wrong = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "alice", "password": "wrong-password" }))
        .send()
        .await
        .expect("login");
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let anonymous = app
        .client
        .get(app.url("/api/users"))
        .send()
        .await
        .expect("users");
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let health = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("health");
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn change_password_then_login_with_new_one() {
    let app = spawn_app().await;
    let alice = app.register("alice").await;

    let changed = app
        .client
        .post(app.url("/api/auth/change-password"))
        .bearer_auth(&alice.access_token)
        .json(&json!({ "currentPassword": "secret123", "newPassword": "even-better" }))
        .send()
        .await
        .expect("change password");
    assert_eq!(changed.status(), StatusCode::NO_CONTENT);

    let old = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "alice", "password": "secret123" }))
        .send()
        .await
        .expect("old login");
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": "alice", "password": "even-better" }))
        .send()
        .await
        .expect("new login");
    assert_eq!(new.status(), StatusCode::OK);

    let logout = app
        .client
        .post(app.url("/api/auth/logout"))
        .bearer_auth(&alice.access_token)
        .send()
        .await
        .expect("logout");
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn users_can_be_listed_and_fetched() {
    let app = spawn_app().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let users: Value = app
        .get("/api/users", &alice.access_token)
        .await
        .json()
        .await
        .expect("users json");
    assert_eq!(users.as_array().map(Vec::len), Some(2));

    let fetched = app
        .get(&format!("/api/users/{}", bob.user_id), &alice.access_token)
        .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    let body: Value = fetched.json().await.expect("user json");
    assert_eq!(body["username"], "bob");

    let missing = app
        .get(
            "/api/users/00000000-0000-0000-0000-000000000000",
            &alice.access_token,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_update_and_delete_only_their_own_account() {
    let app = spawn_app().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let foreign = app
        .client
        .put(app.url(&format!("/api/users/{}", bob.user_id)))
        .bearer_auth(&alice.access_token)
        .json(&json!({ "username": "mallory" }))
        .send()
        .await
        .expect("update request");
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let taken = app
        .client
        .put(app.url(&format!("/api/users/{}", alice.user_id)))
        .bearer_auth(&alice.access_token)
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .expect("update request");
    assert_eq!(taken.status(), StatusCode::CONFLICT);

    let updated = app
        .client
        .put(app.url(&format!("/api/users/{}", alice.user_id)))
        .bearer_auth(&alice.access_token)
        .json(&json!({ "username": "alicia", "avatar": "https://example.com/a.png" }))
        .send()
        .await
        .expect("update request");
    assert_eq!(updated.status(), StatusCode::OK);
    let body: Value = updated.json().await.expect("user json");
    assert_eq!(body["username"], "alicia");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["avatar"], "https://example.com/a.png");

    let foreign_delete = app
        .client
        .delete(app.url(&format!("/api/users/{}", bob.user_id)))
        .bearer_auth(&alice.access_token)
        .send()
        .await
        .expect("delete request");
    assert_eq!(foreign_delete.status(), StatusCode::FORBIDDEN);

    for expected in [StatusCode::NO_CONTENT, StatusCode::NOT_FOUND] {
        let deleted = app
            .client
            .delete(app.url(&format!("/api/users/{}", alice.user_id)))
            .bearer_auth(&alice.access_token)
            .send()
            .await
            .expect("delete request");
        assert_eq!(deleted.status(), expected);
    }

    let gone = app
        .get(&format!("/api/users/{}", alice.user_id), &bob.access_token)
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}
