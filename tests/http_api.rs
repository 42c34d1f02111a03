use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use eva_online::{
    AppConfig, AppState, InMemoryRemoteStore, RemoteStore, build_router,
    auth::{AuthorizationRequest, OAuthProvider},
    core::{SessionRecord, TwitterProfile, User},
    remote::InMemoryObjectStorage,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

struct FakeTwitter;

#[async_trait]
impl OAuthProvider for FakeTwitter {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn client_id(&self) -> Option<&str> {
        Some("fake-client")
    }

    fn callback_url(&self) -> &str {
        "http://localhost:8080/api/auth/twitter/callback"
    }

    fn authorize(&self) -> eva_online::Result<AuthorizationRequest> {
        Ok(AuthorizationRequest {
            url: "https://twitter.example/authorize?state=st4te".to_string(),
            state: "st4te".to_string(),
            code_verifier: "verif1er".to_string(),
        })
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> eva_online::Result<String> {
        assert_eq!(code_verifier, "verif1er");
        Ok(format!("token-for-{code}"))
    }

    async fn fetch_profile(&self, _access_token: &str) -> eva_online::Result<TwitterProfile> {
        Ok(TwitterProfile {
            twitter_id: "42".to_string(),
            handle: "newcomer".to_string(),
            display_name: "New Comer".to_string(),
            avatar_url: None,
        })
    }
}

struct TestApp {
    router: axum::Router,
    remote: Arc<InMemoryRemoteStore>,
}

impl TestApp {
    fn new(oauth: Option<Arc<dyn OAuthProvider>>) -> Self {
        let remote = Arc::new(InMemoryRemoteStore::new());
        let storage = Arc::new(InMemoryObjectStorage::new(
            "https://storage.example",
            "bug-attachments",
        ));
        let config = AppConfig::demo().with_admins(["admin"]);
        let router = build_router(AppState::new(remote.clone(), storage, oauth, config));
        Self { router, remote }
    }

    async fn user(&self, handle: &str, points: i64, is_og: bool) -> (User, String) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            twitter_id: None,
            handle: handle.to_string(),
            display_name: handle.to_string(),
            avatar_url: None,
            points,
            is_og,
            og_reward_granted: false,
            questions_asked_today: 3,
            created_at: now,
            updated_at: now,
        };
        self.remote.insert_user(user.clone()).await;
        let token = self.remote.create_auth_session(user.id).await.unwrap();
        (user, token)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        payload: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match payload {
            Some(payload) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response expected");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("response body should be readable")
            .to_bytes();

        if body.is_empty() {
            return (status, Value::Null);
        }
        let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
        (status, json)
    }
}

#[tokio::test]
async fn health_and_identity() {
    let app = TestApp::new(None);
    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "ok");

    let (status, body) = app.send(Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = app
        .send(Method::GET, "/api/me", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, token) = app.user("eva", 1_000, false).await;
    let (status, body) = app.send(Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["handle"], "eva");
}

#[tokio::test]
async fn sessions_credit_points_and_feed_the_leaderboard() {
    let app = TestApp::new(None);
    let (_, token) = app.user("eva", 1_000, false).await;
    app.user("bob", 1_200, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/sessions",
            Some(&token),
            Some(json!({ "questions": [
                { "quality": 8, "sincerity": 8 },
                { "quality": 10, "sincerity": 10 }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["session"]["points_earned"], 900);
    assert_eq!(body["data"]["user"]["points"], 1_900);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/sessions",
            Some(&token),
            Some(json!({ "questions": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(Method::GET, "/api/leaderboard?limit=500", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["handle"], "eva");
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[1]["handle"], "bob");
}

#[tokio::test]
async fn bug_bounty_lifecycle() {
    let app = TestApp::new(None);
    let (reporter, reporter_token) = app.user("reporter", 1_000, false).await;
    let (_, admin_token) = app.user("admin", 1_000, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/bug-bounty",
            Some(&reporter_token),
            Some(json!({
                "title": "Leaderboard shows stale totals",
                "description": "Refreshing does not update my points",
                "severity": "high",
                "attachments": [
                    { "path": "reporter/shot.png", "file_name": "shot.png", "content_type": "image/png" }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let report_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "open");

    let (status, _) = app
        .send(Method::GET, "/api/bug-bounty", Some(&reporter_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::GET, "/api/bug-bounty?status=open", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = &body["data"][0];
    assert_eq!(listed["id"], report_id.as_str());
    let url = listed["signed_attachments"][0]["signed_url"].as_str().unwrap();
    assert!(url.starts_with(
        "https://storage.example/storage/v1/object/sign/bug-attachments/reporter/shot.png"
    ));

    let award_uri = format!("/api/bug-bounty/{report_id}/award");
    let (status, body) = app
        .send(Method::POST, &award_uri, Some(&admin_token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["new_total"], 3_500);
    assert_eq!(body["data"]["report"]["awarded_points"], 2_500);

    let (status, _) = app
        .send(Method::POST, &award_uri, Some(&admin_token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(Method::GET, "/api/bug-bounty/mine", Some(&reporter_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["status"], "awarded");

    let (status, body) = app
        .send(Method::GET, "/api/notifications", Some(&reporter_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["kind"], "bounty_awarded");
    let notification_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let read_uri = format!("/api/notifications/{notification_id}/read");
    let (status, _) = app
        .send(Method::POST, &read_uri, Some(&reporter_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(Method::POST, &read_uri, Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stored = app.remote.get_user_by_id(reporter.id).await.unwrap().unwrap();
    assert_eq!(stored.points, 3_500);
}

#[tokio::test]
async fn admin_recovery_and_restore() {
    let app = TestApp::new(None);
    let (eva, _) = app.user("eva", 1_000, true).await;
    let (_, admin_token) = app.user("admin", 1_000, false).await;
    for points in [350, 400] {
        app.remote
            .insert_session(SessionRecord {
                id: Uuid::new_v4(),
                user_id: eva.id,
                question_count: 2,
                points_earned: points,
                created_at: Utc::now(),
            })
            .await;
    }

    // Omitting dryRun means dry run.
    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/recover-points",
            Some(&admin_token),
            Some(json!({ "handle": "@eva" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["new_points"], 11_750);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/recover-points",
            Some(&admin_token),
            Some(json!({ "handle": "eva", "dryRun": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["operation"], "recover");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/recover-points",
            Some(&admin_token),
            Some(json!({ "handle": "ghost", "dryRun": false })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::GET,
            "/api/admin/backups?handle=eva&restored=false",
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let backup_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/admin/backups/preview?backupId={backup_id}"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delta"], -10_750);
    assert_eq!(body["data"]["warnings"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .send(Method::GET, "/api/admin/backups/preview", Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/backups/restore",
            Some(&admin_token),
            Some(json!({ "backupId": backup_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["points"], 1_000);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/backups/restore",
            Some(&admin_token),
            Some(json!({ "backupId": backup_id })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no valid backup found");
}

#[tokio::test]
async fn batch_recovery_and_question_reset() {
    let app = TestApp::new(None);
    let (_, admin_token) = app.user("admin", 1_000, false).await;
    let (alice, alice_token) = app.user("alice", 900, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/recover-points/batch",
            Some(&admin_token),
            Some(json!({ "dryRun": false, "delayMs": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processed"], 2);
    assert_eq!(body["data"]["applied"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["last_handle"], "alice");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/recover-points/batch",
            Some(&alice_token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/reset-question-count",
            Some(&admin_token),
            Some(json!({ "handle": "alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reset"], 1);
    let alice = app.remote.get_user_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(alice.questions_asked_today, 0);
    assert_eq!(alice.points, 1_000);
}

#[tokio::test]
async fn maintenance_feedback_is_validated() {
    let app = TestApp::new(None);
    let (status, _) = app
        .send(
            Method::POST,
            "/api/maintenance/feedback",
            None,
            Some(json!({ "message": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/maintenance/feedback",
            None,
            Some(json!({ "message": "When is it back?", "email": "a@b.c", "handle": "@eva" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["handle"], "eva");
    assert_eq!(app.remote.feedback().await.len(), 1);
}

#[tokio::test]
async fn login_without_credentials_redirects_to_demo() {
    let app = TestApp::new(None);
    let request = Request::builder()
        .uri("/api/auth/twitter")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:8080/?demo=true"
    );

    let (status, body) = app
        .send(Method::GET, "/api/auth/twitter/debug", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["configured"], false);
    assert_eq!(body["data"]["remote_backend"], "memory");
}

#[tokio::test]
async fn oauth_callback_issues_a_session() {
    let app = TestApp::new(Some(Arc::new(FakeTwitter)));

    let start = Request::builder()
        .uri("/api/auth/twitter")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(start).await.unwrap();
    assert!(response.status().is_redirection());
    let state_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert_eq!(state_cookie, "eva_oauth_state=st4te.verif1er");

    // Mismatched state falls back to the demo redirect.
    let forged = Request::builder()
        .uri("/api/auth/twitter/callback?code=abc&state=other")
        .header(header::COOKIE, &state_cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(forged).await.unwrap();
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:8080/?demo=true"
    );

    let callback = Request::builder()
        .uri("/api/auth/twitter/callback?code=abc&state=st4te")
        .header(header::COOKIE, &state_cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(callback).await.unwrap();
    assert!(response.status().is_redirection());
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:8080/?login=success"
    );
    let session = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.strip_prefix("eva_session="))
        .and_then(|value| value.split(';').next())
        .unwrap()
        .to_string();

    let (status, body) = app.send(Method::GET, "/api/me", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["handle"], "newcomer");
    assert_eq!(body["data"]["points"], 1_000);
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let app = TestApp::new(None);
    let (_, admin_token) = app.user("admin", 1_000, false).await;
    let (_, user_token) = app.user("eva", 1_000, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/recover-points",
            Some(&admin_token),
            Some(json!({ "dryRun": false })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("handle"));

    let (status, body) = app
        .send(
            Method::GET,
            "/api/leaderboard?limit=lots",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/notifications/not-a-uuid/read",
            Some(&user_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn bounty_awards_are_bounded_and_survive_notification_failure() {
    let app = TestApp::new(None);
    let (reporter, reporter_token) = app.user("reporter", 1_000, false).await;
    let (_, admin_token) = app.user("admin", 1_000, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/bug-bounty",
            Some(&reporter_token),
            Some(json!({
                "title": "Typo on profile page",
                "description": "Says 'pionts'",
                "severity": "low"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let award_uri = format!("/api/bug-bounty/{}/award", body["data"]["id"].as_str().unwrap());

    let (status, body) = app
        .send(
            Method::POST,
            &award_uri,
            Some(&admin_token),
            Some(json!({ "points": i64::MAX })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    app.remote.set_notification_outage(true);
    let (status, body) = app
        .send(
            Method::POST,
            &award_uri,
            Some(&admin_token),
            Some(json!({ "points": 750 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["new_total"], 1_750);

    let stored = app.remote.get_user_by_id(reporter.id).await.unwrap().unwrap();
    assert_eq!(stored.points, 1_750);
}

#[tokio::test]
async fn negative_batch_cap_is_rejected() {
    let app = TestApp::new(None);
    let (_, admin_token) = app.user("admin", 1_000, false).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/recover-points/batch",
            Some(&admin_token),
            Some(json!({ "maxPointChange": i64::MIN, "dryRun": true })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}
