use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cx_api::{router, AppState};
use cx_auth_jwt::{JwtCredentialManager, TokenPolicy};
use cx_cache::MemoryCache;
use cx_core::models::{NewUser, Role, TokenKind};
use cx_core::traits::{Cache, CredentialManager, UserRepo};
use cx_core::MockMediaStore;
use cx_db_sqlite::SqliteCatalog;
use cx_services::{AuthService, MovieService, ReactionService};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    catalog: Arc<SqliteCatalog>,
    credentials: Arc<JwtCredentialManager>,
}

async fn app() -> TestApp {
    let catalog = Arc::new(SqliteCatalog::new("sqlite::memory:", 1).await.unwrap());
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
    let credentials = Arc::new(JwtCredentialManager::new(
        TokenPolicy {
            access_secret: "access".into(),
            refresh_secret: "refresh".into(),
            access_ttl: chrono::Duration::minutes(5),
            refresh_ttl: chrono::Duration::hours(24),
        },
        cache.clone(),
    ));

    let mut media = MockMediaStore::new();
    media.expect_permanent_path().returning(|name| format!("public/movie/{name}"));
    media.expect_promote().returning(|_| Ok(()));

    let state = AppState {
        movies: MovieService::new(catalog.clone(), catalog.clone(), cache, Arc::new(media), Duration::from_secs(3)),
        reactions: ReactionService::new(catalog.clone(), catalog.clone(), catalog.clone()),
        auth: AuthService::new(catalog.clone(), credentials.clone()),
    };

    TestApp { router: router(Arc::new(state)), catalog, credentials }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    /// Bearer value for a freshly inserted user with the given role.
    async fn bearer(&self, email: &str, role: Role) -> String {
        let user = self
            .catalog
            .insert_user(&NewUser { email: email.into(), password_hash: "unused".into(), role })
            .await
            .unwrap();
        let token = self.credentials.issue(user.id, role, TokenKind::Access).unwrap();
        format!("Bearer {token}")
    }

    /// Seeds a director, two genres and one movie; returns the movie id.
    async fn seed_movie(&self, admin: &str) -> i64 {
        let (status, director) = self
            .send(
                "POST",
                "/director",
                Some(admin),
                Some(json!({ "name": "Christopher Nolan", "dob": "1970-07-30", "nationality": "UK" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let mut genre_ids = Vec::new();
        for name in ["sci-fi", "thriller"] {
            let (status, genre) = self.send("POST", "/genre", Some(admin), Some(json!({ "name": name }))).await;
            assert_eq!(status, StatusCode::CREATED);
            genre_ids.push(genre["id"].clone());
        }

        let (status, movie) = self
            .send(
                "POST",
                "/movie",
                Some(admin),
                Some(json!({
                    "title": "Inception",
                    "detail": "A thief who steals corporate secrets through dreams.",
                    "directorId": director["id"],
                    "genreIds": genre_ids,
                    "movieFileName": "inception.mp4",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{movie}");
        assert_eq!(movie["genres"].as_array().unwrap().len(), 2);
        assert_eq!(movie["movieFilePath"], "public/movie/inception.mp4");
        movie["id"].as_i64().unwrap()
    }
}

fn basic(email: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{email}:{password}")))
}

#[tokio::test]
async fn test_like_status_follows_the_caller() {
    let app = app().await;
    let admin = app.bearer("admin@cinedex.io", Role::Admin).await;
    let id = app.seed_movie(&admin).await;

    let (status, outcome) = app.send("POST", &format!("/movie/{id}/like"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "isLike": true }));

    let (_, page) = app.send("GET", "/movie", Some(&admin), None).await;
    assert_eq!(page["data"][0]["likeStatus"], json!(true));
    assert_eq!(page["count"], json!(1));

    let (_, page) = app.send("GET", "/movie", None, None).await;
    assert!(page["data"][0].get("likeStatus").is_none());

    let (_, outcome) = app.send("POST", &format!("/movie/{id}/like"), Some(&admin), None).await;
    assert_eq!(outcome, json!({ "isLike": null }));
    let (_, page) = app.send("GET", "/movie", Some(&admin), None).await;
    assert_eq!(page["data"][0]["likeStatus"], Value::Null);
    assert!(page["data"][0].get("likeStatus").is_some());
}

#[tokio::test]
async fn test_error_kinds_map_to_statuses() {
    let app = app().await;
    let admin = app.bearer("admin@cinedex.io", Role::Admin).await;

    let (status, body) = app.send("GET", "/movie/999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "movie not found with ID 999");

    let anonymous_create = json!({
        "title": "Tenet",
        "detail": "inversion",
        "directorId": 1,
        "genreIds": [],
        "movieFileName": "tenet.mp4",
    });
    let (status, body) = app.send("POST", "/movie", None, Some(anonymous_create)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, body) = app.send("GET", "/movie?order=rating_DESC", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = app.send("POST", "/movie/999/like", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.seed_movie(&admin).await;
    let (status, body) = app
        .send("POST", "/genre", Some(&admin), Some(json!({ "name": "sci-fi" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_roles_gate_writes() {
    let app = app().await;

    let (status, user) = app.send("POST", "/auth/register", Some(&basic("viewer@cinedex.io", "popcorn")), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["role"], json!(2));
    assert!(user.get("password").is_none());

    let (status, tokens) = app.send("POST", "/auth/login", Some(&basic("viewer@cinedex.io", "popcorn")), None).await;
    assert_eq!(status, StatusCode::OK);
    let viewer = format!("Bearer {}", tokens["accessToken"].as_str().unwrap());

    let (status, body) = app.send("POST", "/genre", Some(&viewer), Some(json!({ "name": "noir" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app.send("GET", "/movie/recent", Some(&viewer), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send("GET", "/movie/recent", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("POST", "/auth/login", Some(&basic("viewer@cinedex.io", "butter")), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_revoked_token_is_rejected() {
    let app = app().await;
    let bearer = app.bearer("viewer@cinedex.io", Role::User).await;
    let token = bearer.trim_start_matches("Bearer ").to_string();

    let (status, _) = app.send("GET", "/movie/recent", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send("POST", "/auth/token/block", Some(&bearer), Some(json!({ "token": token })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.send("GET", "/movie/recent", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "unauthorized: token has been revoked");
}

#[tokio::test]
async fn test_refresh_token_rotates_access() {
    let app = app().await;
    app.send("POST", "/auth/register", Some(&basic("viewer@cinedex.io", "popcorn")), None).await;
    let (_, tokens) = app.send("POST", "/auth/login", Some(&basic("viewer@cinedex.io", "popcorn")), None).await;

    let refresh = format!("Bearer {}", tokens["refreshToken"].as_str().unwrap());
    let (status, body) = app.send("POST", "/auth/token/access", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = format!("Bearer {}", body["accessToken"].as_str().unwrap());
    let (status, _) = app.send("GET", "/movie/recent", Some(&rotated), None).await;
    assert_eq!(status, StatusCode::OK);

    let access = format!("Bearer {}", tokens["accessToken"].as_str().unwrap());
    let (status, _) = app.send("POST", "/auth/token/access", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A refresh token is not accepted where an access token is expected
    let (status, _) = app.send("GET", "/movie/recent", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
