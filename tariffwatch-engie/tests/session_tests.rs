//! Login and refresh-token rotation against a mock identity service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use chrono::Utc;
use serde_json::json;
use tariffwatch_core::{Credentials, MfaChannel, SessionTokens};
use tariffwatch_engie::{
    AuthSession, ChallengeState, DEFAULT_CLIENT_ID, EngieEndpoints, EngieError, SessionConfig,
    TokenProvider,
};
use tariffwatch_fetch::{MemoryTokenPersistence, PersistError, TokenPersistence};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

fn config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        endpoints: EngieEndpoints::single(server.uri()),
        client_id: DEFAULT_CLIENT_ID.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn credentials() -> Credentials {
    Credentials::new(
        "user@example.com",
        "hunter2",
        "1500000001",
        DEFAULT_CLIENT_ID,
    )
}

fn redirect(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("location", location)
}

fn token_body(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 120,
        "token_type": "Bearer"
    }))
}

/// Steps 1-7: authorize, identifier, password, resume, challenge page.
async fn mount_first_phase(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/authorize"))
        .and(query_param("code_challenge_method", "S256"))
        .and(query_param("client_id", DEFAULT_CLIENT_ID))
        .respond_with(redirect("/u/login/identifier?state=AUTH-STATE"))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/login/identifier"))
        .and(query_param("state", "AUTH-STATE"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "auth0=abc; Path=/"))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/u/login/identifier"))
        .and(body_string_contains("username=user%40example.com"))
        .respond_with(redirect("/u/login/password?state=AUTH-STATE"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/login/password"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/u/login/password"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(redirect("/authorize/resume?state=LOGIN-STATE"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/resume"))
        .and(query_param("state", "LOGIN-STATE"))
        .respond_with(redirect("/u/mfa-sms-challenge?state=MFA-STATE"))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/mfa-sms-challenge"))
        .and(query_param("state", "MFA-STATE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

/// Step 8 for the given code, answered with a redirect back to resume.
async fn mount_code_accepted(server: &MockServer, code: &str) {
    Mock::given(method("POST"))
        .and(path("/u/mfa-sms-challenge"))
        .and(query_param("state", "MFA-STATE"))
        .and(header("cookie", "auth0=abc"))
        .and(body_string_contains(&format!("code={code}")))
        .respond_with(redirect("/authorize/resume?state=LOGIN-STATE"))
        .mount(server)
        .await;
}

/// Steps 9-13: passkey enrollment skip, authorization code, token exchange.
async fn mount_second_phase(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/authorize/resume"))
        .and(query_param("state", "LOGIN-STATE"))
        .respond_with(redirect("/u/passkey-enrollment?state=PASSKEY-STATE"))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/passkey-enrollment"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/u/passkey-enrollment"))
        .and(body_string_contains("action=abort-passkey-enrollment"))
        .respond_with(redirect("/authorize/resume?state=LOGIN-STATE"))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/resume"))
        .and(query_param("state", "LOGIN-STATE"))
        .respond_with(redirect("be.engie.smart://login-callback/nl?code=AUTH-CODE"))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=AUTH-CODE"))
        .and(body_string_contains("code_verifier="))
        .respond_with(token_body("AT-1", "RT-1"))
        .expect(1)
        .mount(server)
        .await;
}

async fn resumed_session(server: &MockServer, refresh_token: &str) -> (AuthSession, Arc<MemoryTokenPersistence>) {
    let persistence = Arc::new(MemoryTokenPersistence::with_tokens(SessionTokens::issued(
        "AT-0",
        refresh_token,
        Some(120),
        Utc::now(),
    )));
    let session = AuthSession::new(config(server), persistence.clone()).unwrap();
    assert!(session.restore().await.unwrap());
    (session, persistence)
}

async fn mount_refresh(server: &MockServer, from: &str, access: &str, to: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(&format!("refresh_token={from}")))
        .respond_with(token_body(access, to))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn full_login_establishes_session() {
    let server = MockServer::start().await;
    mount_first_phase(&server).await;
    mount_code_accepted(&server, "123456").await;
    mount_second_phase(&server).await;

    let persistence = Arc::new(MemoryTokenPersistence::new());
    let session = AuthSession::new(config(&server), persistence.clone()).unwrap();
    assert!(session.needs_reauth());

    let challenge = session.begin_login(&credentials()).await.unwrap();
    assert_eq!(challenge.login_state, "LOGIN-STATE");
    assert_eq!(challenge.challenge_state, "MFA-STATE");
    assert_eq!(challenge.channel, MfaChannel::Sms);
    assert_eq!(challenge.cookie_count(), 1);

    // The challenge survives a process restart.
    let stored = serde_json::to_string(&challenge).unwrap();
    let challenge: ChallengeState = serde_json::from_str(&stored).unwrap();

    let tokens = session.submit_2fa(&challenge, "123456").await.unwrap();
    assert_eq!(tokens.access_token, "AT-1");
    assert_eq!(tokens.refresh_token, "RT-1");
    assert!(!session.needs_reauth());
    assert_eq!(persistence.current().await.unwrap().refresh_token, "RT-1");
}

#[tokio::test]
async fn wrong_code_leaves_challenge_retryable() {
    let server = MockServer::start().await;
    mount_first_phase(&server).await;
    Mock::given(method("POST"))
        .and(path("/u/mfa-sms-challenge"))
        .and(body_string_contains("code=000000"))
        .respond_with(ResponseTemplate::new(400).set_body_string("<p>Invalid code</p>"))
        .expect(1)
        .mount(&server)
        .await;
    mount_code_accepted(&server, "123456").await;
    mount_second_phase(&server).await;

    let session =
        AuthSession::new(config(&server), Arc::new(MemoryTokenPersistence::new())).unwrap();
    let challenge = session.begin_login(&credentials()).await.unwrap();

    let err = session.submit_2fa(&challenge, "000000").await.unwrap_err();
    assert!(matches!(err, EngieError::InvalidCode(_)));
    assert!(err.is_user_correctable());
    assert!(session.needs_reauth());

    let tokens = session.submit_2fa(&challenge, "123456").await.unwrap();
    assert_eq!(tokens.refresh_token, "RT-1");
}

#[tokio::test]
async fn malformed_code_is_rejected_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let session =
        AuthSession::new(config(&server), Arc::new(MemoryTokenPersistence::new())).unwrap();
    let challenge: ChallengeState = serde_json::from_value(json!({
        "authorize_state": "a",
        "login_state": "b",
        "challenge_state": "c",
        "code_verifier": "v",
        "channel": "sms",
        "client_id": DEFAULT_CLIENT_ID,
        "created_at": Utc::now(),
    }))
    .unwrap();

    for code in ["12345", "abcdef", "1234567", ""] {
        let err = session.submit_2fa(&challenge, code).await.unwrap_err();
        assert!(matches!(err, EngieError::InvalidCode(_)), "code {code:?}");
    }
}

#[tokio::test]
async fn bad_credentials_fail_at_password_step() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/authorize"))
        .respond_with(redirect("/u/login/identifier?state=AUTH-STATE"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/login/identifier"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/u/login/identifier"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/u/login/password"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/u/login/password"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Wrong email or password</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/authorize/resume"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let session =
        AuthSession::new(config(&server), Arc::new(MemoryTokenPersistence::new())).unwrap();
    let err = session.begin_login(&credentials()).await.unwrap_err();
    assert!(matches!(err, EngieError::Auth(_)));
}

#[tokio::test]
async fn blank_credentials_are_config_errors() {
    let server = MockServer::start().await;
    let session =
        AuthSession::new(config(&server), Arc::new(MemoryTokenPersistence::new())).unwrap();
    let blank = Credentials::new("user@example.com", " ", "1500000001", DEFAULT_CLIENT_ID);

    let err = session.begin_login(&blank).await.unwrap_err();
    assert!(matches!(err, EngieError::Config(_)));
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn refresh_rotates_and_persists_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;
    mount_refresh(&server, "RT-2", "AT-3", "RT-3").await;

    let (session, persistence) = resumed_session(&server, "RT-1").await;

    let first = session.refresh().await.unwrap();
    assert_eq!(first.refresh_token, "RT-2");
    assert_eq!(persistence.current().await.unwrap().refresh_token, "RT-2");

    let second = session.refresh().await.unwrap();
    assert_eq!(second.access_token, "AT-3");
    assert_eq!(persistence.current().await.unwrap().refresh_token, "RT-3");
    assert_eq!(persistence.write_count().await, 2);
}

#[tokio::test]
async fn concurrent_refreshes_never_reuse_a_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;
    mount_refresh(&server, "RT-2", "AT-3", "RT-3").await;

    let (session, persistence) = resumed_session(&server, "RT-1").await;
    let session = Arc::new(session);

    let a = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.refresh().await }
    });
    let b = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.refresh().await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(persistence.current().await.unwrap().refresh_token, "RT-3");
}

#[tokio::test]
async fn rejected_refresh_requires_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (session, _) = resumed_session(&server, "RT-1").await;
    let mut health = session.subscribe_health();
    assert!(*health.borrow_and_update());

    let err = session.refresh().await.unwrap_err();
    assert!(err.is_reauth_required());
    assert!(session.needs_reauth());
    assert!(health.has_changed().unwrap());
    assert!(!*health.borrow_and_update());

    // No further exchange is attempted until a new login.
    let err = session.refresh().await.unwrap_err();
    assert!(err.is_reauth_required());
}

#[tokio::test]
async fn server_error_keeps_session_healthy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (session, persistence) = resumed_session(&server, "RT-1").await;

    let err = session.refresh().await.unwrap_err();
    assert!(err.is_transient());
    assert!(!session.needs_reauth());
    assert_eq!(persistence.current().await.unwrap().refresh_token, "RT-1");
}

#[tokio::test]
async fn rate_limited_refresh_reports_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
        .mount(&server)
        .await;

    let (session, _) = resumed_session(&server, "RT-1").await;
    let err = session.refresh().await.unwrap_err();
    assert!(matches!(err, EngieError::RateLimited { retry_after: Some(60) }));
    assert!(!session.needs_reauth());
}

#[tokio::test]
async fn refresh_without_rotation_keeps_old_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "AT-2", "expires_in": 120})),
        )
        .mount(&server)
        .await;

    let (session, _) = resumed_session(&server, "RT-1").await;
    let tokens = session.refresh().await.unwrap();
    assert_eq!(tokens.access_token, "AT-2");
    assert_eq!(tokens.refresh_token, "RT-1");
}

// ============================================================================
// Token Provider
// ============================================================================

#[tokio::test]
async fn access_token_refreshes_restored_refresh_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;

    let persistence = Arc::new(MemoryTokenPersistence::with_tokens(
        SessionTokens::from_refresh_token("RT-1"),
    ));
    let session = AuthSession::new(config(&server), persistence).unwrap();
    session.restore().await.unwrap();

    assert_eq!(session.access_token().await.unwrap(), "AT-2");
    // Still valid: no second exchange.
    assert_eq!(session.access_token().await.unwrap(), "AT-2");
}

#[tokio::test]
async fn refresh_if_expiring_respects_margin() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;

    let (session, _) = resumed_session(&server, "RT-1").await;

    // 120 s left, 60 s margin: nothing to do.
    assert!(!session.refresh_if_expiring(Duration::from_secs(60)).await.unwrap());
    assert!(session.refresh_if_expiring(Duration::from_secs(300)).await.unwrap());
    assert_eq!(session.store().snapshot().await.unwrap().refresh_token, "RT-2");
}

/// Storage whose writes fail while `broken` is set.
#[derive(Default)]
struct SwitchablePersistence {
    broken: AtomicBool,
    inner: MemoryTokenPersistence,
}

#[async_trait]
impl TokenPersistence for SwitchablePersistence {
    async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
        self.inner.load_tokens().await
    }

    async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PersistError::Storage("read-only filesystem".to_string()));
        }
        self.inner.persist_tokens(tokens).await
    }

    async fn clear_tokens(&self) -> Result<(), PersistError> {
        self.inner.clear_tokens().await
    }
}

#[tokio::test]
async fn unsaved_rotation_is_flagged_and_retried() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;

    let persistence = Arc::new(SwitchablePersistence::default());
    persistence
        .inner
        .persist_tokens(&SessionTokens::from_refresh_token("RT-1"))
        .await
        .unwrap();
    persistence.broken.store(true, Ordering::SeqCst);
    let session = AuthSession::new(config(&server), persistence.clone()).unwrap();
    assert!(session.restore().await.unwrap());

    // The rotation succeeds upstream even though the write fails.
    let tokens = session.refresh().await.unwrap();
    assert_eq!(tokens.refresh_token, "RT-2");
    assert!(session.store().has_unsaved_tokens());
    assert!(session.store().is_healthy());
    assert_eq!(persistence.inner.current().await.unwrap().refresh_token, "RT-1");

    // Still failing: the flag stays up.
    assert!(!session.refresh_if_expiring(Duration::from_secs(1)).await.unwrap());
    assert!(session.store().has_unsaved_tokens());

    persistence.broken.store(false, Ordering::SeqCst);
    assert!(!session.refresh_if_expiring(Duration::from_secs(1)).await.unwrap());
    assert!(!session.store().has_unsaved_tokens());
    assert_eq!(persistence.inner.current().await.unwrap().refresh_token, "RT-2");
}

#[tokio::test]
async fn renew_after_rejection_reuses_newer_token() {
    let server = MockServer::start().await;
    mount_refresh(&server, "RT-1", "AT-2", "RT-2").await;

    let (session, _) = resumed_session(&server, "RT-1").await;

    // AT-0 was rejected: exchange once.
    assert_eq!(session.renew_after_rejection("AT-0").await.unwrap(), "AT-2");
    // A second caller still holding AT-0 gets AT-2 without an exchange.
    assert_eq!(session.renew_after_rejection("AT-0").await.unwrap(), "AT-2");
}
