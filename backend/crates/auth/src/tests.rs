//! Scenario tests for the auth crate
//! Each module drives the engine end to end over the in-memory store.

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use platform::client::ClientContext;
    use platform::password::ClearTextPassword;
    use platform::rate_limit::{InMemoryRateLimitStore, RateLimitConfig};

    use crate::application::{AuthConfig, AuthEngine, ChannelOtpDelivery, OtpMessage};
    use crate::domain::entity::identity::Identity;
    use crate::domain::repository::IdentityRepository;
    use crate::domain::value_object::{email::Email, role_name::RoleName};
    use crate::infra::{InMemoryPermissionCache, MemoryAuthRepository};

    pub type TestEngine = AuthEngine<MemoryAuthRepository, InMemoryRateLimitStore>;

    pub const PASSWORD: &str = "correct horse battery";

    pub struct Harness {
        pub engine: Arc<TestEngine>,
        pub repo: Arc<MemoryAuthRepository>,
        pub codes: mpsc::Receiver<OtpMessage>,
    }

    /// Engine with generous rate limits so scenarios are not throttled
    pub fn harness() -> Harness {
        harness_with(|config| {
            config.rate_limits.login = RateLimitConfig::new(100, 900);
            config.rate_limits.otp_verify = RateLimitConfig::new(100, 900);
            config.rate_limits.otp_resend = RateLimitConfig::new(100, 300);
        })
    }

    pub fn harness_with(configure: impl FnOnce(&mut AuthConfig)) -> Harness {
        let mut config = AuthConfig::with_random_secrets();
        configure(&mut config);

        let repo = Arc::new(MemoryAuthRepository::with_system_roles());
        let (delivery, codes) = ChannelOtpDelivery::new(16);
        let engine = Arc::new(AuthEngine::new(
            repo.clone(),
            Arc::new(InMemoryRateLimitStore::new()),
            Arc::new(InMemoryPermissionCache::new()),
            Arc::new(delivery),
            config,
        ));

        Harness {
            engine,
            repo,
            codes,
        }
    }

    impl Harness {
        pub async fn seed(&self, email: &str, role: &str) -> Identity {
            let hash = ClearTextPassword::new(PASSWORD.to_string())
                .unwrap()
                .hash(None)
                .unwrap();
            let identity = Identity::new(Email::new(email).unwrap(), hash, RoleName::from_db(role));
            IdentityRepository::create(self.repo.as_ref(), &identity)
                .await
                .unwrap();
            identity
        }

        /// Plaintext of the most recently delivered code
        pub fn last_code(&mut self) -> String {
            let mut last = None;
            while let Ok(message) = self.codes.try_recv() {
                last = Some((*message.code).clone());
            }
            last.expect("no code delivered")
        }
    }

    pub fn client() -> ClientContext {
        ClientContext::new("203.0.113.7".parse().ok(), Some("Mozilla/5.0 Test".to_string()))
    }
}

#[cfg(test)]
mod login_flow_tests {
    use super::support::*;
    use chrono::{Duration, Utc};

    use crate::application::LoginFlow;
    use crate::domain::repository::IdentityRepository;
    use crate::domain::value_object::{
        otp_purpose::OtpPurpose, termination_reason::TerminationReason,
    };
    use crate::error::AuthError;

    #[tokio::test]
    async fn test_login_to_terminate() {
        let mut h = harness();
        let identity = h.seed("ada@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        let pending = flow
            .begin("Ada@Example.com", PASSWORD.to_string(), &client())
            .await
            .unwrap();
        assert_eq!(pending.identity_id, identity.id);

        let code = h.last_code();
        let tokens = flow
            .complete(&identity.id, &code, &client(), Some("laptop".to_string()))
            .await
            .unwrap();

        let validated = h.engine.sessions.validate(&tokens.access_token).await.unwrap();
        assert_eq!(validated.session.id, tokens.session_id);

        h.engine
            .sessions
            .terminate(&tokens.session_id, TerminationReason::Logout, Some(&identity.id))
            .await
            .unwrap();
        assert!(matches!(
            h.engine.sessions.validate(&tokens.access_token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let mut h = harness();
        let identity = h.seed("grace@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        flow.begin("grace@example.com", PASSWORD.to_string(), &client())
            .await
            .unwrap();
        let code = h.last_code();
        flow.complete(&identity.id, &code, &client(), None)
            .await
            .unwrap();

        assert!(matches!(
            flow.complete(&identity.id, &code, &client(), None).await,
            Err(AuthError::NoValidChallenge)
        ));
    }

    #[tokio::test]
    async fn test_attempt_ceiling_blocks_correct_code() {
        let mut h = harness();
        let identity = h.seed("alan@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        flow.begin("alan@example.com", PASSWORD.to_string(), &client())
            .await
            .unwrap();
        let code = h.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for remaining in [2, 1, 0] {
            assert!(matches!(
                flow.complete(&identity.id, wrong, &client(), None).await,
                Err(AuthError::ChallengeMismatch { attempts_remaining })
                    if attempts_remaining == remaining
            ));
        }
        assert_eq!(h.repo.redeemable_challenges(&identity.id, OtpPurpose::Login), 0);
        assert!(matches!(
            flow.complete(&identity.id, &code, &client(), None).await,
            Err(AuthError::AttemptsExceeded)
        ));
    }

    #[tokio::test]
    async fn test_resend_supersedes_previous_code() {
        let mut h = harness();
        let identity = h.seed("edsger@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        flow.begin("edsger@example.com", PASSWORD.to_string(), &client())
            .await
            .unwrap();
        let first = h.last_code();
        flow.resend(&identity.id, &client()).await.unwrap();
        let second = h.last_code();

        if first != second {
            assert!(flow.complete(&identity.id, &first, &client(), None).await.is_err());
        }
        flow.complete(&identity.id, &second, &client(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resend_without_login_in_progress() {
        let h = harness();
        let identity = h.seed("barbara@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        assert!(matches!(
            flow.resend(&identity.id, &client()).await,
            Err(AuthError::NoValidChallenge)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_failures_all_count() {
        let h = harness();
        let identity = h.seed("dennis@example.com", "employee").await;
        let flow = std::sync::Arc::new(LoginFlow::new(h.engine.clone()));

        let attempts: Vec<_> = (0..5)
            .map(|_| {
                let flow = flow.clone();
                tokio::spawn(async move {
                    flow.begin("dennis@example.com", "wrong password".to_string(), &client())
                        .await
                })
            })
            .collect();

        let mut locked = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Err(AuthError::AccountLocked { .. }) => locked += 1,
                Err(AuthError::InvalidCredentials) => {}
                other => panic!("unexpected login result: {:?}", other.map(|_| ())),
            }
        }
        assert_eq!(locked, 1);

        let stored = IdentityRepository::find_by_id(h.repo.as_ref(), &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts.failed, 5);
        assert!(stored.attempts.locked_until.is_some());
    }

    #[tokio::test]
    async fn test_lockout_and_expiry() {
        let mut h = harness();
        let identity = h.seed("ken@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        for _ in 0..4 {
            assert!(matches!(
                flow.begin("ken@example.com", "wrong password".to_string(), &client())
                    .await,
                Err(AuthError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            flow.begin("ken@example.com", "wrong password".to_string(), &client())
                .await,
            Err(AuthError::AccountLocked { .. })
        ));
        // Correct password is refused while locked
        assert!(matches!(
            flow.begin("ken@example.com", PASSWORD.to_string(), &client())
                .await,
            Err(AuthError::AccountLocked { .. })
        ));

        h.repo.with_identity(&identity.id, |i| {
            i.attempts.locked_until = Some(Utc::now() - Duration::seconds(1));
        });
        flow.begin("ken@example.com", PASSWORD.to_string(), &client())
            .await
            .unwrap();
        h.last_code();

        let stored = IdentityRepository::find_by_id(h.repo.as_ref(), &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts.failed, 0);
        assert!(stored.attempts.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_unknown_email_is_invalid_credentials() {
        let h = harness();
        let flow = LoginFlow::new(h.engine.clone());
        assert!(matches!(
            flow.begin("nobody@example.com", PASSWORD.to_string(), &client())
                .await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            flow.begin("not-an-email", PASSWORD.to_string(), &client())
                .await,
            Err(AuthError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let h = harness_with(|config| {
            config.rate_limits.login = platform::rate_limit::RateLimitConfig::new(2, 900);
        });
        h.seed("dennis@example.com", "employee").await;
        let flow = LoginFlow::new(h.engine.clone());

        for _ in 0..2 {
            let _ = flow
                .begin("dennis@example.com", "wrong password".to_string(), &client())
                .await;
        }
        assert!(matches!(
            flow.begin("dennis@example.com", PASSWORD.to_string(), &client())
                .await,
            Err(AuthError::RateLimited { retry_after_secs }) if retry_after_secs > 0
        ));
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let h = harness();
        h.seed("margaret@example.com", "employee").await;
        h.repo.set_unavailable(true);

        let flow = LoginFlow::new(h.engine.clone());
        assert!(matches!(
            flow.begin("margaret@example.com", PASSWORD.to_string(), &client())
                .await,
            Err(AuthError::StoreUnavailable(_))
        ));
    }
}

#[cfg(test)]
mod session_tests {
    use super::support::*;

    use crate::application::{Cleanup, PasswordChange, PasswordChangeInput};
    use crate::domain::repository::SessionRepository;
    use crate::domain::value_object::termination_reason::TerminationReason;
    use crate::error::AuthError;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_fourth_session_flagged() {
        let h = harness();
        let identity = h.seed("linus@example.com", "employee").await;

        let mut created = Vec::new();
        for _ in 0..4 {
            created.push(
                h.engine
                    .sessions
                    .create(&identity, &client(), None)
                    .await
                    .unwrap(),
            );
        }

        assert!(created[3].security_flags.concurrent_sessions);
        for tokens in &created[..3] {
            let session = SessionRepository::find_by_id(h.repo.as_ref(), &tokens.session_id)
                .await
                .unwrap()
                .unwrap();
            assert!(!session.security_flags.concurrent_sessions);
        }
    }

    #[tokio::test]
    async fn test_refresh_does_not_duplicate() {
        let h = harness();
        let identity = h.seed("bjarne@example.com", "employee").await;
        let tokens = h
            .engine
            .sessions
            .create(&identity, &client(), None)
            .await
            .unwrap();

        let refreshed = h.engine.sessions.refresh(&tokens.refresh_token).await.unwrap();
        assert_eq!(refreshed.session_id, tokens.session_id);
        assert_eq!(h.repo.session_count(&identity.id), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_refresh_racing_terminate_leaves_no_usable_token() {
        let h = harness();
        let identity = h.seed("barbara@example.com", "employee").await;

        for _ in 0..10 {
            let tokens = h.engine.sessions.create(&identity, &client(), None).await.unwrap();

            let engine = h.engine.clone();
            let refresh_token = tokens.refresh_token.clone();
            let refresh =
                tokio::spawn(async move { engine.sessions.refresh(&refresh_token).await });

            let engine = h.engine.clone();
            let (session_id, identity_id) = (tokens.session_id, identity.id);
            let terminate = tokio::spawn(async move {
                engine
                    .sessions
                    .terminate(&session_id, TerminationReason::Logout, Some(&identity_id))
                    .await
            });

            terminate.await.unwrap().unwrap();
            match refresh.await.unwrap() {
                Ok(refreshed) => assert!(matches!(
                    h.engine.sessions.validate(&refreshed.access_token).await,
                    Err(AuthError::SessionNotFound)
                )),
                Err(err) => assert!(matches!(err, AuthError::SessionNotFound)),
            }
            assert!(h.engine.sessions.validate(&tokens.access_token).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_password_change_ends_other_sessions() {
        let h = harness();
        let identity = h.seed("niklaus@example.com", "employee").await;
        let current = h.engine.sessions.create(&identity, &client(), None).await.unwrap();
        let other = h.engine.sessions.create(&identity, &client(), None).await.unwrap();

        let terminated = PasswordChange::new(h.engine.clone())
            .execute(PasswordChangeInput {
                identity_id: identity.id,
                session_id: current.session_id,
                current_password: PASSWORD.to_string(),
                new_password: "a much longer passphrase".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(terminated, 1);
        h.engine.sessions.validate(&current.access_token).await.unwrap();
        assert!(matches!(
            h.engine.sessions.validate(&other.access_token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_password_change_wrong_current() {
        let h = harness();
        let identity = h.seed("donald@example.com", "employee").await;
        let current = h.engine.sessions.create(&identity, &client(), None).await.unwrap();

        let result = PasswordChange::new(h.engine.clone())
            .execute(PasswordChangeInput {
                identity_id: identity.id,
                session_id: current.session_id,
                current_password: "not my password".to_string(),
                new_password: "a much longer passphrase".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_cleanup_expires_idle_sessions() {
        let h = harness();
        let identity = h.seed("john@example.com", "employee").await;
        let idle = h.engine.sessions.create(&identity, &client(), None).await.unwrap();
        let live = h.engine.sessions.create(&identity, &client(), None).await.unwrap();
        h.repo.with_session(&idle.session_id, |s| {
            s.last_activity_at = Utc::now() - Duration::hours(1);
        });

        let report = Cleanup::new(h.engine.clone()).run_once().await.unwrap();
        assert_eq!(report.idle_sessions_terminated, 1);

        let session = h.engine.sessions.find(&idle.session_id).await.unwrap();
        assert!(!session.is_active);
        h.engine.sessions.validate(&live.access_token).await.unwrap();
    }
}

#[cfg(test)]
mod admin_tests {
    use super::support::*;
    use std::collections::BTreeSet;

    use crate::application::{AdministrativeReset, NewRole, RoleAdministration, RoleUpdate};
    use crate::domain::repository::IdentityRepository;
    use crate::domain::value_object::role_name::RoleName;
    use crate::error::AuthError;

    fn contractor(hierarchy: i32) -> NewRole {
        NewRole {
            name: "contractor".to_string(),
            hierarchy,
            modules: BTreeSet::from(["projects".to_string()]),
            actions: BTreeSet::from(["read".to_string()]),
            dashboard_route: "/contractor".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_hierarchy_ordering() {
        let h = harness();
        let permissions = &h.engine.permissions;
        let (top, employee, viewer) = (
            RoleName::from_db("super_admin"),
            RoleName::from_db("employee"),
            RoleName::from_db("viewer"),
        );

        assert!(permissions.can_manage(&top, &employee).await);
        assert!(!permissions.can_manage(&viewer, &employee).await);
        assert!(matches!(
            permissions.ensure_can_manage(&viewer, &employee).await,
            Err(AuthError::InsufficientPermission)
        ));
    }

    #[tokio::test]
    async fn test_admin_creates_and_assigns_role() {
        let h = harness();
        let admin = h.seed("root@example.com", "admin").await;
        let worker = h.seed("worker@example.com", "employee").await;
        let roles = RoleAdministration::new(h.engine.clone());

        let policy = roles.create(&admin, contractor(45)).await.unwrap();
        assert!(!policy.is_system);

        let updated = roles
            .assign(&admin, "contractor", &[worker.id])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let stored = IdentityRepository::find_by_id(h.repo.as_ref(), &worker.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.role.as_str(), "contractor");

        // Still held, so not deletable
        assert!(matches!(
            roles.delete(&admin, "contractor").await,
            Err(AuthError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_role_can_be_reactivated_and_deleted() {
        let h = harness();
        let admin = h.seed("root@example.com", "admin").await;
        let roles = RoleAdministration::new(h.engine.clone());
        roles.create(&admin, contractor(45)).await.unwrap();

        let deactivate = || RoleUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        let policy = roles.update(&admin, "contractor", deactivate()).await.unwrap();
        assert!(!policy.is_active);

        let policy = roles
            .update(
                &admin,
                "contractor",
                RoleUpdate {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(policy.is_active);

        roles.update(&admin, "contractor", deactivate()).await.unwrap();
        roles.delete(&admin, "contractor").await.unwrap();
        assert!(matches!(
            roles.delete(&admin, "contractor").await,
            Err(AuthError::RoleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_role_admin_requires_authority() {
        let h = harness();
        let admin = h.seed("root@example.com", "admin").await;
        let employee = h.seed("staff@example.com", "employee").await;
        let roles = RoleAdministration::new(h.engine.clone());

        assert!(matches!(
            roles.create(&employee, contractor(45)).await,
            Err(AuthError::InsufficientPermission)
        ));
        // Cannot create a role above oneself
        assert!(matches!(
            roles.create(&admin, contractor(5)).await,
            Err(AuthError::InsufficientPermission)
        ));
        roles.create(&admin, contractor(45)).await.unwrap();
        assert!(matches!(
            roles.create(&admin, contractor(46)).await,
            Err(AuthError::RoleAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_system_roles_protected() {
        let h = harness();
        let top = h.seed("owner@example.com", "super_admin").await;
        let roles = RoleAdministration::new(h.engine.clone());

        assert!(matches!(
            roles.delete(&top, "viewer").await,
            Err(AuthError::SystemRoleProtected)
        ));
        assert!(matches!(
            roles
                .update(
                    &top,
                    "viewer",
                    RoleUpdate {
                        hierarchy: Some(60),
                        ..Default::default()
                    }
                )
                .await,
            Err(AuthError::SystemRoleProtected)
        ));

        // Permission sets of system roles may still change
        let updated = roles
            .update(
                &top,
                "viewer",
                RoleUpdate {
                    modules: Some(BTreeSet::from(["dashboard".to_string(), "reports".to_string()])),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.modules.contains("reports"));
        let resolved = roles.permissions_of("viewer").await.unwrap();
        assert!(resolved.allows("reports", None));
    }

    #[tokio::test]
    async fn test_unlock_requires_managing_target() {
        let h = harness();
        let manager = h.seed("boss@example.com", "manager").await;
        let peer = h.seed("peer@example.com", "manager").await;
        let worker = h.seed("worker@example.com", "employee").await;
        h.repo.with_identity(&worker.id, |i| {
            i.attempts.failed = 5;
            i.attempts.locked_until = Some(chrono::Utc::now() + chrono::Duration::hours(1));
        });
        let reset = AdministrativeReset::new(h.engine.clone());

        assert!(matches!(
            reset.unlock(&manager, &peer.id).await,
            Err(AuthError::InsufficientPermission)
        ));
        reset.unlock(&manager, &worker.id).await.unwrap();

        let stored = IdentityRepository::find_by_id(h.repo.as_ref(), &worker.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts.failed, 0);
        assert!(stored.attempts.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_foreign_session_hidden_from_peers() {
        let h = harness();
        let a = h.seed("a@example.com", "employee").await;
        let b = h.seed("b@example.com", "employee").await;
        let tokens = h.engine.sessions.create(&b, &client(), None).await.unwrap();
        let reset = AdministrativeReset::new(h.engine.clone());

        assert!(matches!(
            reset.terminate_session(&a, &tokens.session_id).await,
            Err(AuthError::SessionNotFound)
        ));
        reset.terminate_session(&b, &tokens.session_id).await.unwrap();
    }
}

#[cfg(test)]
mod http_tests {
    use super::support::*;
    use axum::Router;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    use crate::presentation::router::api_router;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body, retry_after)
    }

    fn post(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "Mozilla/5.0 Test")
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri)
            .header(header::USER_AGENT, "Mozilla/5.0 Test")
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn sign_in(h: &mut Harness, app: &Router, email: &str) -> String {
        let (status, body, _) = send(
            app,
            post(
                "/api/auth/login",
                json!({ "email": email, "password": PASSWORD }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let identity_id = body["data"]["identityId"].as_str().unwrap().to_string();
        assert!(body["data"].get("code").is_none());

        let code = h.last_code();
        let (status, body, _) = send(
            app,
            post(
                "/api/auth/login/verify",
                json!({ "identityId": identity_id, "code": code }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tokenType"], "Bearer");
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_login_me_logout() {
        let mut h = harness();
        h.seed("ada@example.com", "manager").await;
        let app = api_router(h.engine.clone());

        let token = sign_in(&mut h, &app, "ada@example.com").await;

        let (status, body, _) = send(&app, get("/api/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["role"], "manager");
        assert_eq!(body["data"]["dashboardRoute"], "/manager/dashboard");

        let (status, _, _) = send(&app, post("/api/auth/logout", json!({}), Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body, _) = send(&app, get("/api/auth/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = harness();
        let app = api_router(h.engine.clone());

        let (status, body, _) = send(&app, get("/api/auth/sessions", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_wrong_password_and_lock_statuses() {
        let h = harness();
        h.seed("grace@example.com", "employee").await;
        let app = api_router(h.engine.clone());
        let wrong = json!({ "email": "grace@example.com", "password": "nope nope nope" });

        for _ in 0..4 {
            let (status, _, _) = send(&app, post("/api/auth/login", wrong.clone(), None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body, _) = send(&app, post("/api/auth/login", wrong, None)).await;
        assert_eq!(status.as_u16(), 423);
        assert!(body["data"]["lockedUntil"].is_string());
    }

    #[tokio::test]
    async fn test_rate_limit_returns_retry_after() {
        let h = harness_with(|config| {
            config.rate_limits.login = platform::rate_limit::RateLimitConfig::new(1, 900);
        });
        let app = api_router(h.engine.clone());
        let body = json!({ "email": "x@example.com", "password": "whatever pass" });

        send(&app, post("/api/auth/login", body.clone(), None)).await;
        let (status, body, retry_after) = send(&app, post("/api/auth/login", body, None)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["data"]["retryAfter"].as_u64().unwrap() > 0);
        assert!(retry_after.is_some());
    }

    fn login_via(peer: &str, forwarded_for: &str) -> Request<Body> {
        let body = json!({ "email": "x@example.com", "password": "whatever pass" });
        let mut req = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::from(body.to_string()))
            .unwrap();
        let peer: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_shares_peer_limit() {
        let h = harness_with(|config| {
            config.rate_limits.login = platform::rate_limit::RateLimitConfig::new(2, 900);
        });
        let app = api_router(h.engine.clone());

        let mut statuses = Vec::new();
        for i in 1..=4 {
            let req = login_via("198.51.100.20:5000", &format!("203.0.113.{}", i));
            statuses.push(send(&app, req).await.0);
        }
        assert_eq!(statuses[..2], [StatusCode::UNAUTHORIZED; 2]);
        assert_eq!(statuses[2..], [StatusCode::TOO_MANY_REQUESTS; 2]);
    }

    #[tokio::test]
    async fn test_trusted_proxy_forwards_client_address() {
        let h = harness_with(|config| {
            config.rate_limits.login = platform::rate_limit::RateLimitConfig::new(1, 900);
            config.trusted_proxies = vec!["10.0.0.1".parse().unwrap()];
        });
        let app = api_router(h.engine.clone());

        // Each forwarded client gets its own bucket
        for client in ["203.0.113.1", "203.0.113.2"] {
            let (status, _, _) = send(&app, login_via("10.0.0.1:443", client)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, _, _) = send(&app, login_via("10.0.0.1:443", "203.0.113.1")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_error_envelope() {
        let h = harness();
        let app = api_router(h.engine.clone());

        let syntax = Request::post("/api/auth/login/verify")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body, _) = send(&app, syntax).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body, _) = send(
            &app,
            post(
                "/api/auth/login/verify",
                json!({ "identityId": "nope", "code": 1 }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let missing_type = Request::post("/api/auth/login")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body, _) = send(&app, missing_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_sessions_and_permissions() {
        let mut h = harness();
        h.seed("alan@example.com", "employee").await;
        let app = api_router(h.engine.clone());
        let token = sign_in(&mut h, &app, "alan@example.com").await;

        let (status, body, _) = send(&app, get("/api/auth/sessions", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["isCurrent"], true);

        let (status, body, _) = send(
            &app,
            get("/api/roles/check?module=attendance&action=update", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["allowed"], true);

        let (_, body, _) = send(
            &app,
            get("/api/roles/check?module=settings", Some(&token)),
        )
        .await;
        assert_eq!(body["data"]["allowed"], false);

        let (status, body, _) =
            send(&app, get("/api/roles/viewer/permissions", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["hierarchy"], 50);

        // Employees lack the roles module
        let (status, _, _) = send(
            &app,
            post(
                "/api/roles",
                json!({ "name": "intern", "hierarchy": 60, "dashboardRoute": "/intern" }),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let mut h = harness();
        h.seed("edsger@example.com", "employee").await;
        let app = api_router(h.engine.clone());

        let (_, body, _) = send(
            &app,
            post(
                "/api/auth/login",
                json!({ "email": "edsger@example.com", "password": PASSWORD }),
                None,
            ),
        )
        .await;
        let identity_id = body["data"]["identityId"].as_str().unwrap().to_string();
        let code = h.last_code();
        let (_, body, _) = send(
            &app,
            post(
                "/api/auth/login/verify",
                json!({ "identityId": identity_id, "code": code }),
                None,
            ),
        )
        .await;
        let session_id = body["data"]["sessionId"].clone();
        let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();

        let (status, body, _) = send(
            &app,
            post(
                "/api/auth/refresh",
                json!({ "refreshToken": refresh_token }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sessionId"], session_id);

        let access = body["data"]["accessToken"].as_str().unwrap().to_string();
        let (status, _, _) = send(&app, get("/api/auth/me", Some(&access))).await;
        assert_eq!(status, StatusCode::OK);

        // An access token is not accepted as a refresh token
        let (status, _, _) = send(
            &app,
            post("/api/auth/refresh", json!({ "refreshToken": access }), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
