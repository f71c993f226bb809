use anyhow::Result;
use std::sync::Arc;

use tracing::{debug, error, warn};

use axum_extra::extract::cookie::{Cookie, SameSite};
use tower_http::services::ServeDir;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, response, HeaderValue, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::session::{Session, COOKIE_SESSION_TOKEN_KEY};
use super::state::{
    GuardedAuthStateStore, GuardedBookmarkStore, GuardedUserStore, GuardedViewRegistry,
    OptionalOidcClient, ServerState,
};
use super::websocket::ws_handler;
use super::{log_requests, pages, RequestsLoggingLevel, ServerConfig};
use crate::bookmark_store::BookmarkStore;
use crate::config::OidcConfig;
use crate::oidc::{AuthStateStore, OidcClient};
use crate::sync::ViewRegistry;
use crate::user::auth::{AuthToken, AuthTokenValue};
use crate::user::{UserAuthTokenStore, UserStore};

#[cfg(feature = "test-login")]
#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

#[derive(Serialize)]
struct MeResponse {
    email: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CreateBookmarkBody {
    pub title: String,
    pub url: String,
}

#[derive(Deserialize, Debug)]
struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// Failures of the OAuth callback. They all end in a silent bounce back to
/// the sign-in page, but the variants keep the log lines precise.
#[derive(Debug, thiserror::Error)]
enum AuthFlowError {
    #[error("identity provider is not configured")]
    NotConfigured,
    #[error("missing code or state parameter")]
    MissingParams,
    #[error("no pending authorization for this state")]
    UnknownState,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> Response {
    // The session gate: unauthenticated loads never see page content.
    let session = match session {
        None => return Redirect::to("/login").into_response(),
        Some(session) => session,
    };

    let email = match state.user_store.get_user(session.user_id) {
        Ok(Some(user)) => user.email.unwrap_or_default(),
        Ok(None) => String::new(),
        Err(err) => {
            error!("Error loading user {}: {}", session.user_id, err);
            String::new()
        }
    };
    Html(pages::render_main_page(&email)).into_response()
}

async fn login_page() -> Response {
    Html(pages::LOGIN_PAGE).into_response()
}

async fn app_js() -> Response {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        pages::APP_JS,
    )
        .into_response()
}

async fn app_css() -> Response {
    ([(header::CONTENT_TYPE, "text/css")], pages::APP_CSS).into_response()
}

/// Start the redirect handshake with the identity provider.
///
/// Initiation failures are logged and land back on the sign-in page with no
/// user-facing message.
async fn oauth_login(
    State(oidc_client): State<OptionalOidcClient>,
    State(auth_state_store): State<GuardedAuthStateStore>,
) -> Response {
    let client = match oidc_client {
        Some(client) => client,
        None => {
            warn!("Sign-in requested but no identity provider is configured");
            return Redirect::to("/login").into_response();
        }
    };

    match client.authorize_url() {
        Ok((url, auth_state)) => {
            auth_state_store.cleanup_expired().await;
            auth_state_store.store(auth_state).await;
            Redirect::to(&url).into_response()
        }
        Err(err) => {
            error!("Error initiating sign-in: {}", err);
            Redirect::to("/login").into_response()
        }
    }
}

async fn oauth_callback(
    State(state): State<ServerState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    match complete_oauth_callback(&state, params).await {
        Ok(response) => response,
        Err(err) => {
            error!("Error completing sign-in: {}", err);
            Redirect::to("/login").into_response()
        }
    }
}

async fn complete_oauth_callback(
    state: &ServerState,
    params: OAuthCallbackParams,
) -> std::result::Result<Response, AuthFlowError> {
    let client = state
        .oidc_client
        .as_ref()
        .ok_or(AuthFlowError::NotConfigured)?;

    let (code, csrf_state) = match (params.code, params.state) {
        (Some(code), Some(csrf_state)) => (code, csrf_state),
        _ => return Err(AuthFlowError::MissingParams),
    };

    let stored_state = state
        .auth_state_store
        .take(&csrf_state)
        .await
        .ok_or(AuthFlowError::UnknownState)?;

    let auth_result = client
        .exchange_code(&code, &csrf_state, &stored_state)
        .await?;

    let user = state
        .user_store
        .upsert_user_by_subject(&auth_result.subject, auth_result.email.as_deref())?;

    let token = AuthToken::issue(user.id);
    state.user_store.add_user_auth_token(token.clone())?;

    debug!("Session established for user {}", user.id);
    Ok(session_cookie_redirect(&token, "/"))
}

fn session_cookie_redirect(token: &AuthToken, location: &str) -> Response {
    let cookie_value = HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly",
        COOKIE_SESSION_TOKEN_KEY, token.value.0
    ))
    .unwrap();
    response::Builder::new()
        .status(StatusCode::SEE_OTHER)
        .header(header::SET_COOKIE, cookie_value)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .unwrap()
}

/// Dev-only direct session mint, for running without an identity provider.
#[cfg(feature = "test-login")]
#[derive(Deserialize, Debug)]
struct TestLoginBody {
    pub subject: String,
    pub email: Option<String>,
}

#[cfg(feature = "test-login")]
async fn test_login(State(state): State<ServerState>, Json(body): Json<TestLoginBody>) -> Response {
    let user = match state
        .user_store
        .upsert_user_by_subject(&body.subject, body.email.as_deref())
    {
        Ok(user) => user,
        Err(err) => {
            error!("Error upserting test user: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let token = AuthToken::issue(user.id);
    if let Err(err) = state.user_store.add_user_auth_token(token.clone()) {
        error!("Error storing test auth token: {}", err);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let response_body = serde_json::to_string(&LoginSuccessResponse {
        token: token.value.0.clone(),
    })
    .unwrap();
    let cookie_value = HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly",
        COOKIE_SESSION_TOKEN_KEY, token.value.0
    ))
    .unwrap();
    response::Builder::new()
        .status(StatusCode::CREATED)
        .header(header::SET_COOKIE, cookie_value)
        .body(Body::from(response_body))
        .unwrap()
}

/// Terminate the session. Invoked by a plain form POST; the only observable
/// result is the expired cookie and the redirect.
async fn signout(State(user_store): State<GuardedUserStore>, session: Session) -> Response {
    match user_store.delete_user_auth_token(&AuthTokenValue(session.token)) {
        Ok(_) => {
            let cookie_value = Cookie::build(Cookie::new(COOKIE_SESSION_TOKEN_KEY, ""))
                .path("/")
                .expires(time::OffsetDateTime::now_utc() - time::Duration::days(1)) // Expire it in the past
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::SEE_OTHER)
                .header(header::SET_COOKIE, cookie_value.to_string())
                .header(header::LOCATION, "/login")
                .body(Body::empty())
                .unwrap()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn me(session: Session, State(user_store): State<GuardedUserStore>) -> Response {
    match user_store.get_user(session.user_id) {
        Ok(Some(user)) => Json(MeResponse { email: user.email }).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Error loading user {}: {}", session.user_id, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_bookmarks(
    session: Session,
    State(bookmark_store): State<GuardedBookmarkStore>,
) -> Response {
    match bookmark_store.get_user_bookmarks(session.user_id) {
        Ok(bookmarks) => Json(bookmarks).into_response(),
        Err(err) => {
            error!("Error fetching bookmarks: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn post_bookmark(
    session: Session,
    State(bookmark_store): State<GuardedBookmarkStore>,
    State(view_registry): State<GuardedViewRegistry>,
    Json(body): Json<CreateBookmarkBody>,
) -> Response {
    let title = body.title.trim();
    let url = body.url.trim();
    if title.is_empty() || url.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match bookmark_store.insert_bookmark(session.user_id, title, url) {
        Ok(bookmark) => {
            // The explicit refresh signal: open list views of this user
            // re-run their full read.
            let reached = view_registry.request_refresh(session.user_id).await;
            debug!("Refresh requested for {} open view(s)", reached);
            (StatusCode::CREATED, Json(bookmark)).into_response()
        }
        Err(err) => {
            error!("Error adding bookmark: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_bookmark(
    session: Session,
    State(bookmark_store): State<GuardedBookmarkStore>,
    Path(id): Path<String>,
) -> Response {
    match bookmark_store.delete_bookmark(&id, session.user_id) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => {
            // Already gone (or never this user's): deletion is a no-op.
            debug!("Delete of absent bookmark {} is a no-op", id);
            StatusCode::OK.into_response()
        }
        Err(err) => {
            error!("Error deleting bookmark: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn make_app(
    config: ServerConfig,
    bookmark_store: Arc<dyn BookmarkStore>,
    user_store: Arc<dyn UserStore>,
    oidc_config: Option<OidcConfig>,
) -> Result<Router> {
    let oidc_client = match oidc_config {
        Some(oidc_config) => match OidcClient::new(oidc_config).await {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                // The server still runs; sign-in attempts bounce back to the
                // login page until the provider is reachable.
                error!("Failed to initialize OIDC client: {:?}", err);
                None
            }
        },
        None => None,
    };

    let state = ServerState {
        config: config.clone(),
        bookmark_store,
        user_store,
        view_registry: Arc::new(ViewRegistry::new()),
        oidc_client,
        auth_state_store: Arc::new(AuthStateStore::new()),
    };

    #[allow(unused_mut)]
    let mut auth_routes: Router<ServerState> = Router::new()
        .route("/login", get(oauth_login))
        .route("/callback", get(oauth_callback))
        .route("/signout", post(signout));
    #[cfg(feature = "test-login")]
    {
        auth_routes = auth_routes.route("/test-login", post(test_login));
    }
    let auth_routes = auth_routes.with_state(state.clone());

    let user_routes: Router = Router::new()
        .route("/me", get(me))
        .route("/bookmarks", get(get_bookmarks))
        .route("/bookmarks", post(post_bookmark))
        .route("/bookmarks/{id}", delete(delete_bookmark))
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let page_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .route("/login", get(login_page))
            .route("/assets/app.js", get(app_js))
            .route("/assets/app.css", get(app_css))
            .with_state(state.clone()),
    };

    let mut app: Router = page_router
        .nest("/v1/auth", auth_routes)
        .nest("/v1", user_routes);

    app = app.layer(middleware::from_fn_with_state(state.clone(), log_requests));

    Ok(app)
}

pub async fn run_server(
    bookmark_store: Arc<dyn BookmarkStore>,
    user_store: Arc<dyn UserStore>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    frontend_dir_path: Option<String>,
    oidc_config: Option<OidcConfig>,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
        frontend_dir_path,
    };
    let app = make_app(config, bookmark_store, user_store, oidc_config).await?;

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .unwrap();

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmark_store::SqliteBookmarkStore;
    use crate::user::SqliteUserStore;
    use axum::{body::Body, http::Request};
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    async fn make_test_app() -> (TempDir, Router, Arc<SqliteUserStore>) {
        let dir = TempDir::new().unwrap();
        let bookmark_store =
            Arc::new(SqliteBookmarkStore::new(dir.path().join("bookmarks.db")).unwrap());
        let user_store = Arc::new(SqliteUserStore::new(dir.path().join("user.db")).unwrap());

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, bookmark_store, user_store.clone(), None)
            .await
            .unwrap();
        (dir, app, user_store)
    }

    fn mint_session(user_store: &SqliteUserStore) -> String {
        let user = user_store
            .upsert_user_by_subject("sub-test", Some("tester@example.com"))
            .unwrap();
        let token = AuthToken::issue(user.id);
        user_store.add_user_auth_token(token.clone()).unwrap();
        token.value.0
    }

    #[tokio::test]
    async fn responds_forbidden_on_protected_routes() {
        let (_dir, app, _user_store) = make_test_app().await;

        let protected_routes = vec!["/v1/me", "/v1/bookmarks", "/v1/ws"];

        for route in protected_routes.into_iter() {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "route {}", route);
        }

        let request = Request::builder()
            .method("POST")
            .uri("/v1/auth/signout")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::builder()
            .method("DELETE")
            .uri("/v1/bookmarks/123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn home_redirects_to_login_without_session() {
        let (_dir, app, _user_store) = make_test_app().await;

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login"
        );
    }

    #[tokio::test]
    async fn login_page_is_public() {
        let (_dir, app, _user_store) = make_test_app().await;

        let request = Request::builder()
            .uri("/login")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn home_renders_for_authenticated_user() {
        let (_dir, app, user_store) = make_test_app().await;
        let token = mint_session(&user_store);

        let request = Request::builder()
            .uri("/")
            .header("Cookie", format!("session_token={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("tester@example.com"));
    }

    #[tokio::test]
    async fn oauth_login_without_provider_bounces_to_login_page() {
        let (_dir, app, _user_store) = make_test_app().await;

        let request = Request::builder()
            .uri("/v1/auth/login")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login"
        );
    }

    #[tokio::test]
    async fn create_rejects_empty_fields() {
        let (_dir, app, user_store) = make_test_app().await;
        let token = mint_session(&user_store);

        for body in [
            r#"{"title":"Google","url":""}"#,
            r#"{"title":"","url":"https://google.com"}"#,
            r#"{"title":"  ","url":"https://google.com"}"#,
        ] {
            let request = Request::builder()
                .method("POST")
                .uri("/v1/bookmarks")
                .header("content-type", "application/json")
                .header("Cookie", format!("session_token={}", token))
                .body(Body::from(body))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn create_and_delete_roundtrip() {
        let (_dir, app, user_store) = make_test_app().await;
        let token = mint_session(&user_store);

        let request = Request::builder()
            .method("POST")
            .uri("/v1/bookmarks")
            .header("content-type", "application/json")
            .header("Cookie", format!("session_token={}", token))
            .body(Body::from(r#"{"title":"Google","url":"https://google.com"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let bookmark: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = bookmark["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/v1/bookmarks/{}", id))
            .header("Cookie", format!("session_token={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/v1/bookmarks")
            .header("Cookie", format!("session_token={}", token))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let bookmarks: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert!(bookmarks.is_empty());
    }
}
