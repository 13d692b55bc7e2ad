mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clouddeploy_client::{
    ApiError, ClientConfig, ClientContext, RequestOptions, SessionSignal, TokenStore,
};
use reqwest::Method;
use support::{client, eventually, spawn_backend, PASSWORD};

fn count_unauthorized(ctx: &ClientContext) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    ctx.session().signals().subscribe(move |signal| {
        if *signal == SessionSignal::Unauthorized {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    hits
}

#[tokio::test]
async fn login_succeeds_with_valid_credentials() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);

    let user = ctx.api().login("a@b.com", PASSWORD).await.expect("login");

    assert_eq!(user.email, "a@b.com");
    assert_eq!(user.id, "1");
    let token = ctx.session().access_token().expect("token stored");
    assert!(!token.is_empty());
    assert_eq!(ctx.api().cached_user().map(|u| u.email), Some("a@b.com".into()));
}

#[tokio::test]
async fn short_password_fails_locally_and_stores_nothing() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);

    let err = ctx.api().login("a@b.com", "abc").await.unwrap_err();

    assert!(matches!(err, ApiError::InvalidInput { .. }));
    assert_eq!(err.status_code(), 400);
    assert!(!ctx.session().has_token());
    assert_eq!(backend.access_token(), "", "no request reached the server");
}

#[tokio::test]
async fn wrong_password_is_a_server_side_401() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    let unauthorized = count_unauthorized(&ctx);

    let err = ctx.api().login("a@b.com", "wrong-password").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Invalid email or password");
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
    // Nothing to clear, so nothing to announce
    assert_eq!(unauthorized.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn authenticated_call_without_token_fails_fast() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);

    let err = ctx.api().list_projects().await.unwrap_err();

    assert!(matches!(err, ApiError::MissingToken));
    assert_eq!(err.status_code(), 401);
    assert!(backend.seen_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();

    backend.set_refresh_delay(Duration::from_millis(100));
    backend.expire_access_token();

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let api = ctx.api().clone();
            tokio::spawn(async move { api.list_projects().await })
        })
        .collect();
    for call in calls {
        call.await.unwrap().expect("retried call succeeds");
    }

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.session().access_token().as_deref(), Some("access-2"));
    // The rotated-out refresh token is kept when the server sends none
    assert_eq!(ctx.session().refresh_token().as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn retry_happens_once_and_second_401_is_terminal() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();
    let unauthorized = count_unauthorized(&ctx);

    backend.reject_all.store(true, Ordering::SeqCst);
    let err = ctx.api().list_projects().await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *backend.seen_tokens.lock().unwrap(),
        vec!["access-1".to_string(), "access-2".to_string()]
    );
    assert!(!ctx.session().has_token());
    assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_failure_rejects_every_waiter_and_signals_once() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();
    let unauthorized = count_unauthorized(&ctx);

    backend.fail_refresh.store(true, Ordering::SeqCst);
    backend.set_refresh_delay(Duration::from_millis(200));
    backend.expire_access_token();

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let api = ctx.api().clone();
            tokio::spawn(async move { api.list_projects().await })
        })
        .collect();

    let mut errors = Vec::new();
    for call in calls {
        errors.push(call.await.unwrap().unwrap_err());
    }

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    for err in &errors {
        assert!(matches!(err, ApiError::RefreshFailed { status: 401, .. }), "{err:?}");
        assert_eq!(err.to_string(), errors[0].to_string());
    }
    assert!(ctx.session().snapshot().access_token.is_none());
    assert!(ctx.session().snapshot().refresh_token.is_none());
}

#[tokio::test]
async fn slow_response_times_out() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);

    let err = ctx
        .api()
        .request::<(), serde_json::Value>(
            Method::GET,
            "/slow",
            None,
            RequestOptions::public().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.status_code(), 408);
    // Giving up must also drop the connection, not leave it running
    eventually(|| backend.slow_cancelled.load(Ordering::SeqCst)).await;
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(format!("http://{addr}/api"), std::env::temp_dir());
    let ctx = ClientContext::with_store(config, TokenStore::in_memory().unwrap()).unwrap();

    let err = ctx.api().login("a@b.com", PASSWORD).await.unwrap_err();
    assert!(err.is_network_error());
    assert_eq!(err.status_code(), 0);
}

#[tokio::test]
async fn empty_success_body_decodes_as_unit() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();

    let () = ctx.api().delete("/empty").await.expect("204 is fine");
}

#[tokio::test]
async fn missing_project_is_none() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();

    assert!(ctx.api().get_project("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn current_user_failure_ends_the_session() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();
    assert!(ctx.api().validate_session().await);

    backend.reject_all.store(true, Ordering::SeqCst);
    backend.fail_refresh.store(true, Ordering::SeqCst);

    assert!(ctx.api().current_user().await.is_none());
    assert!(!ctx.session().has_token());
    assert!(ctx.api().cached_user().is_none());
}

#[tokio::test]
async fn logout_clears_locally_even_when_server_refuses() {
    let backend = spawn_backend().await;
    let ctx = client(&backend);
    ctx.api().login("a@b.com", PASSWORD).await.unwrap();

    let logged_out = Arc::new(AtomicUsize::new(0));
    {
        let logged_out = logged_out.clone();
        ctx.session().signals().subscribe(move |signal| {
            if *signal == SessionSignal::LoggedOut {
                logged_out.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
    backend.reject_all.store(true, Ordering::SeqCst);
    backend.fail_refresh.store(true, Ordering::SeqCst);

    ctx.api().logout().await;

    assert!(backend.logout_calls.load(Ordering::SeqCst) >= 1);
    assert!(!ctx.session().has_token());
    assert_eq!(logged_out.load(Ordering::SeqCst), 1);
}
