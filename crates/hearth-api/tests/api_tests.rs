use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use hearth_api::{AppStateInner, router};
use hearth_db::Database;
use hearth_jobs::worker::{WorkerConfig, drain};

struct TestApp {
    app: Router,
    db: Arc<Database>,
}

fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state = AppStateInner::new(db.clone(), 30);
    TestApp {
        app: router(state),
        db,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Register `username` and return `(user_id, token)`.
    async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
        (
            body["user_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn test_register_login_logout() {
    let t = test_app();
    let (user_id, token) = t.register("Alice").await;

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": "  alice ", "password": "another password" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "ALICE", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.as_str());
    assert_eq!(body["username"], "Alice");
    let second_token = body["token"].as_str().unwrap().to_string();
    assert_ne!(second_token, token);

    let (status, _) = t.call(Method::GET, "/friends", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.call(Method::POST, "/auth/logout", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.call(Method::GET, "/friends", Some(token.as_str()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.call(Method::GET, "/friends", Some(second_token.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let t = test_app();
    let (status, _) = t.call(Method::GET, "/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.call(Method::GET, "/friends", Some("not-a-session"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let t = test_app();
    let attempt = json!({ "username": "ghost", "password": "whatever123" });

    for _ in 0..10 {
        let (status, _) = t.call(Method::POST, "/auth/login", None, Some(attempt.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = t.call(Method::POST, "/auth/login", None, Some(attempt)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_channels_and_messages() {
    let t = test_app();
    let (_, owner) = t.register("owner").await;
    let (_, guest) = t.register("guest").await;

    let (status, server) = t
        .call(Method::POST, "/servers", Some(owner.as_str()), Some(json!({ "name": "Lounge" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let server_id = server["id"].as_str().unwrap().to_string();

    let channels_uri = format!("/servers/{}/channels", server_id);
    let (status, channel) = t
        .call(Method::POST, &channels_uri, Some(owner.as_str()), Some(json!({ "name": "Off Topic" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let channel_id = channel["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(Method::POST, &channels_uri, Some(owner.as_str()), Some(json!({ "name": "off-topic" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let messages_uri = format!("/channels/{}/messages", channel_id);
    let (status, _) = t
        .call(Method::POST, &messages_uri, Some(guest.as_str()), Some(json!({ "body": "let me in" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .call(Method::POST, &format!("/servers/{}/join", server_id), Some(guest.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = t
        .call(Method::POST, &format!("/servers/{}/join", server_id), Some(guest.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    for body in ["first", "second"] {
        let (status, _) = t
            .call(Method::POST, &messages_uri, Some(guest.as_str()), Some(json!({ "body": body })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, messages) = t.call(Method::GET, &messages_uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies.len(), 2);
    assert!(bodies.contains(&"first") && bodies.contains(&"second"));
    assert_eq!(messages[0]["author_username"], "guest");

    let (status, listed) = t.call(Method::GET, &channels_uri, Some(guest.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, found) = t
        .call(Method::GET, &format!("{}/OFF-TOPIC", channels_uri), Some(guest.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], channel_id.as_str());
    let (status, _) = t
        .call(Method::GET, &format!("{}/missing", channels_uri), Some(guest.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stranger) = t.register("stranger").await;
    let (status, _) = t
        .call(Method::GET, &format!("{}/off-topic", channels_uri), Some(stranger.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_server_deletion_over_http() {
    let t = test_app();
    let (_, owner) = t.register("owner").await;
    let (_, guest) = t.register("guest").await;

    let (_, server) = t
        .call(Method::POST, "/servers", Some(owner.as_str()), Some(json!({ "name": "Doomed" })))
        .await;
    let server_id = server["id"].as_str().unwrap().to_string();
    t.call(Method::POST, &format!("/servers/{}/join", server_id), Some(guest.as_str()), None)
        .await;
    let (_, channel) = t
        .call(
            Method::POST,
            &format!("/servers/{}/channels", server_id),
            Some(owner.as_str()),
            Some(json!({ "name": "general" })),
        )
        .await;
    let channel_id = channel["id"].as_str().unwrap().to_string();
    for n in 0..3 {
        t.call(
            Method::POST,
            &format!("/channels/{}/messages", channel_id),
            Some(owner.as_str()),
            Some(json!({ "body": format!("message {}", n) })),
        )
        .await;
    }

    let deletion_uri = format!("/servers/{}/deletion", server_id);

    let (status, _) = t.call(Method::POST, &deletion_uri, Some(guest.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = t.call(Method::GET, &deletion_uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, started) = t.call(Method::POST, &deletion_uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["ok"], true);
    assert_eq!(started["status"], "in_progress");
    assert_eq!(started["targetKind"], "server");
    assert!(started["completedAt"].is_null());

    let (_, again) = t.call(Method::POST, &deletion_uri, Some(owner.as_str()), None).await;
    assert_eq!(again["operationId"], started["operationId"]);

    let (_, hidden) = t.call(Method::GET, &deletion_uri, Some(guest.as_str()), None).await;
    assert!(hidden.is_null());

    drain(&t.db, &WorkerConfig::default(), 50).unwrap();

    let (status, done) = t.call(Method::GET, &deletion_uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["operationId"], started["operationId"]);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["deletedMessages"], 3);
    assert_eq!(done["deletedChannels"], 1);
    assert_eq!(done["deletedMemberships"], 1);
    assert_eq!(done["deletedServers"], 1);
    assert!(done["completedAt"].is_i64());

    let (status, _) = t.call(Method::GET, &format!("/servers/{}", server_id), Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.call(Method::POST, &deletion_uri, Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_creator_may_delete_channel() {
    let t = test_app();
    let (_, owner) = t.register("owner").await;
    let (_, guest) = t.register("guest").await;

    let (_, server) = t
        .call(Method::POST, "/servers", Some(owner.as_str()), Some(json!({ "name": "Lounge" })))
        .await;
    let server_id = server["id"].as_str().unwrap().to_string();
    t.call(Method::POST, &format!("/servers/{}/join", server_id), Some(guest.as_str()), None)
        .await;
    let (_, channel) = t
        .call(
            Method::POST,
            &format!("/servers/{}/channels", server_id),
            Some(guest.as_str()),
            Some(json!({ "name": "guest-room" })),
        )
        .await;
    let channel_id = channel["id"].as_str().unwrap().to_string();

    let (status, started) = t
        .call(Method::POST, &format!("/channels/{}/deletion", channel_id), Some(guest.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["targetKind"], "channel");
    assert_eq!(started["channelId"], channel_id.as_str());

    drain(&t.db, &WorkerConfig::default(), 10).unwrap();

    let (_, done) = t
        .call(Method::GET, &format!("/channels/{}/deletion", channel_id), Some(guest.as_str()), None)
        .await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["deletedChannels"], 1);

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/channels/{}/messages", channel_id),
            Some(guest.as_str()),
            Some(json!({ "body": "too late" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.call(Method::GET, &format!("/servers/{}", server_id), Some(owner.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_friendships() {
    let t = test_app();
    let (alice_id, alice) = t.register("alice").await;
    let (bob_id, bob) = t.register("bob").await;
    let friend_uri = format!("/friends/{}", bob_id);

    let (status, created) = t.call(Method::PUT, &friend_uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, existing) = t
        .call(Method::PUT, &format!("/friends/{}", alice_id), Some(bob.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(existing["id"], created["id"]);

    let (_, listed) = t.call(Method::GET, "/friends", Some(bob.as_str()), None).await;
    assert_eq!(listed["friend_ids"], json!([alice_id]));

    let (status, fetched) = t.call(Method::GET, &friend_uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], created["id"]);

    let (status, _) = t.call(Method::PUT, &format!("/friends/{}", alice_id), Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t.call(Method::PUT, "/friends/nobody", Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.call(Method::DELETE, &friend_uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.call(Method::DELETE, &friend_uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.call(Method::GET, &friend_uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_identity_links() {
    let t = test_app();
    let (alice_id, alice) = t.register("alice").await;
    let (_, bob) = t.register("bob").await;
    let link = json!({ "provider": "GitHub", "subject": "12345" });

    let (status, first) = t
        .call(Method::POST, "/auth/identities", Some(alice.as_str()), Some(link.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["provider"], "github");

    let (status, again) = t
        .call(Method::POST, "/auth/identities", Some(alice.as_str()), Some(link.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], first["id"]);

    let (status, _) = t.call(Method::POST, "/auth/identities", Some(bob.as_str()), Some(link)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, mine) = t
        .call(Method::GET, "/auth/identities/GitHub/12345", Some(alice.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["id"], first["id"]);
    assert_eq!(mine["last_used_at"], again["last_used_at"]);

    let (status, _) = t
        .call(Method::GET, "/auth/identities/github/12345", Some(bob.as_str()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let account = t.db.get_provider_account("github", "12345").unwrap().unwrap();
    assert_eq!(account.user_id, alice_id);
}
