//! Admission middleware for axum.
//!
//! Runs the admission pipeline in front of a route. Each layer is bound to one
//! action, so routes pick their own limits:
//!
//! ```ignore
//! use axum::{Router, routing::post, middleware};
//!
//! let app = Router::new()
//!     .route("/messages", post(send_message))
//!     .layer(middleware::from_fn_with_state(
//!         AdmissionState::new(orchestrator, Action::Message),
//!         admission_middleware,
//!     ));
//! ```
//!
//! The client IP is the socket peer unless that peer is listed in
//! `admission.trusted_proxies`, in which case forwarded headers are read.
//! Serve with `into_make_service_with_connect_info::<SocketAddr>()`: without
//! a peer address the request is fingerprinted without an IP.
//!
//! Upstream authentication inserts an [`AuthenticatedSubject`]; without one the
//! caller is limited per device. On admit the handler receives the caller's
//! [`VisibilityMultiplier`] and [`DeviceFingerprint`] as extensions. Neither
//! is written to the response.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::AdmissionOrchestrator;
use crate::domain::admission::{RequestContext, Verdict};
use crate::domain::fingerprint::{FingerprintHash, HeaderSnapshot};
use crate::domain::foundation::UserId;
use crate::domain::rate_limit::{Action, CostHints};

/// Middleware state: the pipeline plus the action this route performs.
#[derive(Clone)]
pub struct AdmissionState {
    orchestrator: Arc<AdmissionOrchestrator>,
    action: Action,
    trusted_proxies: Arc<[IpAddr]>,
}

impl AdmissionState {
    pub fn new(orchestrator: Arc<AdmissionOrchestrator>, action: Action) -> Self {
        let trusted_proxies = orchestrator.config().trusted_proxies.clone().into();
        Self {
            orchestrator,
            action,
            trusted_proxies,
        }
    }
}

/// The authenticated account, inserted by upstream auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(pub UserId);

/// Ranking weight for the caller's content. Never expose it to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityMultiplier(pub f64);

/// Device hash of the admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint(pub FingerprintHash);

pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = request_context(
        &request,
        connect_info.as_ref(),
        state.action,
        &state.trusted_proxies,
    );
    let subject = request.extensions().get::<AuthenticatedSubject>().cloned();

    let verdict = match &subject {
        Some(AuthenticatedSubject(user)) => {
            state
                .orchestrator
                .admit(user.as_str(), state.action, &ctx)
                .await
        }
        None => state.orchestrator.admit_anonymous(state.action, &ctx).await,
    };

    if !verdict.allowed {
        return denial_response(&verdict);
    }

    request
        .extensions_mut()
        .insert(VisibilityMultiplier(verdict.visibility_multiplier));
    if let Some(fingerprint) = verdict.fingerprint {
        request.extensions_mut().insert(DeviceFingerprint(fingerprint));
    }
    next.run(request).await
}

fn request_context<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    action: Action,
    trusted_proxies: &[IpAddr],
) -> RequestContext {
    let headers = snapshot(request.headers());
    let mut cost = CostHints::default();
    if action == Action::PhotoUpload {
        cost.file_size_bytes = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
    }
    let client_ip = extract_client_ip(request, connect_info, trusted_proxies);
    RequestContext::new(headers, client_ip).with_cost(cost)
}

/// Fingerprint fields from the request headers. Non-UTF-8 values count as empty.
fn snapshot(headers: &HeaderMap) -> HeaderSnapshot {
    HeaderSnapshot::from_pairs(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

/// Client IP. Forwarded headers count only when the socket peer is a trusted
/// proxy; then the rightmost `X-Forwarded-For` hop that is not itself a
/// trusted proxy wins, then `X-Real-IP`.
fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer = connect_info?.0.ip();
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        let hops: Vec<IpAddr> = forwarded
            .split(',')
            .map_while(|hop| hop.trim().parse().ok())
            .collect();
        if let Some(client) = hops.iter().rev().find(|hop| !trusted_proxies.contains(hop)) {
            return Some(client.to_string());
        }
        if let Some(first) = hops.first() {
            return Some(first.to_string());
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.trim().parse::<IpAddr>().ok())
    {
        return Some(real_ip.to_string());
    }

    Some(peer.to_string())
}

fn denial_response(verdict: &Verdict) -> Response {
    let code = verdict.reason.map(|r| r.as_str()).unwrap_or("denied");
    let retry_after = verdict.retry_after_header();

    let mut response = (
        verdict.http_status,
        Json(serde_json::json!({
            "error": verdict.message.as_deref().unwrap_or("request denied"),
            "code": code,
            "retry_after_secs": retry_after,
        })),
    )
        .into_response();

    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::store::InMemoryKeyValueStore;
    use crate::adapters::throttle::InMemoryThrottleRepository;
    use crate::application::{DeviceFingerprintEngine, ShadowThrottleEngine, TokenBucketLimiter};
    use crate::config::{AdmissionConfig, FingerprintConfig, RateLimitConfig};
    use crate::domain::rate_limit::BucketLimits;
    use crate::domain::throttle::EscalationRules;
    use crate::ports::Clock;
    use axum::{body::Body, http::StatusCode, middleware, routing::post, Extension, Router};
    use tower::ServiceExt;

    fn orchestrator() -> Arc<AdmissionOrchestrator> {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::fixed());
        let store = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        let mut rate_limit = RateLimitConfig::default();
        *rate_limit.actions.get_mut(Action::Message) = BucketLimits::new(2.0, 0.5, 1.0, 0.0);

        Arc::new(AdmissionOrchestrator::new(
            Arc::new(DeviceFingerprintEngine::new(
                store.clone(),
                clock.clone(),
                Arc::new(FingerprintConfig::default()),
            )),
            Arc::new(TokenBucketLimiter::new(store, clock.clone(), rate_limit)),
            Arc::new(ShadowThrottleEngine::new(
                Arc::new(InMemoryThrottleRepository::new()),
                clock,
                EscalationRules::default(),
            )),
            AdmissionConfig::default(),
        ))
    }

    async fn echo_visibility(Extension(VisibilityMultiplier(v)): Extension<VisibilityMultiplier>) -> String {
        v.to_string()
    }

    fn app(orchestrator: Arc<AdmissionOrchestrator>) -> Router {
        Router::new()
            .route("/messages", post(echo_visibility))
            .layer(middleware::from_fn_with_state(
                AdmissionState::new(orchestrator, Action::Message),
                admission_middleware,
            ))
    }

    fn message_request(user: Option<&str>) -> axum::http::Request<Body> {
        let mut request = axum::http::Request::builder()
            .method("POST")
            .uri("/messages")
            .header("User-Agent", "Mozilla/5.0 Firefox/121.0")
            .header("Accept-Language", "de-DE")
            .header("Accept-Encoding", "gzip")
            .header("X-Forwarded-For", "198.51.100.4, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        if let Some(user) = user {
            request
                .extensions_mut()
                .insert(AuthenticatedSubject(UserId::new(user).unwrap()));
        }
        request
    }

    // ════════════════════════════════════════════════════════════════════════════
    // IP Extraction Tests
    // ════════════════════════════════════════════════════════════════════════════

    fn peer(ip: [u8; 4]) -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from((ip, 40_000)))
    }

    const PROXY: [u8; 4] = [10, 0, 0, 1];

    fn proxies() -> Vec<IpAddr> {
        vec![IpAddr::from(PROXY), IpAddr::from([10, 0, 0, 2])]
    }

    #[test]
    fn untrusted_peer_forwarded_headers_are_ignored() {
        let request = axum::http::Request::builder()
            .header("X-Forwarded-For", "1.2.3.4")
            .header("X-Real-IP", "9.9.9.9")
            .body(())
            .unwrap();
        assert_eq!(
            extract_client_ip(&request, Some(&peer([203, 0, 113, 9])), &proxies()),
            Some("203.0.113.9".to_string())
        );
        assert_eq!(
            extract_client_ip(&request, Some(&peer(PROXY)), &[]),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn trusted_proxy_yields_rightmost_untrusted_hop() {
        let request = axum::http::Request::builder()
            .header("X-Forwarded-For", "6.6.6.6, 1.2.3.4, 10.0.0.2")
            .body(())
            .unwrap();
        assert_eq!(
            extract_client_ip(&request, Some(&peer(PROXY)), &proxies()),
            Some("1.2.3.4".to_string())
        );
    }

    #[test]
    fn trusted_proxy_falls_back_to_real_ip_then_peer() {
        let real = axum::http::Request::builder()
            .header("X-Real-IP", "9.8.7.6")
            .body(())
            .unwrap();
        assert_eq!(
            extract_client_ip(&real, Some(&peer(PROXY)), &proxies()),
            Some("9.8.7.6".to_string())
        );

        let bare = axum::http::Request::builder().body(()).unwrap();
        assert_eq!(
            extract_client_ip(&bare, Some(&peer(PROXY)), &proxies()),
            Some("10.0.0.1".to_string())
        );
        assert_eq!(extract_client_ip(&bare, None, &proxies()), None);
    }

    #[test]
    fn snapshot_reads_fingerprint_headers_only() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("agent"));
        headers.insert("dnt", HeaderValue::from_static("1"));
        headers.insert("x-custom", HeaderValue::from_static("ignored"));

        let snap = snapshot(&headers);
        assert_eq!(snap.user_agent, "agent");
        assert_eq!(snap.dnt, "1");
        assert_eq!(snap.accept, "");
    }

    #[test]
    fn photo_uploads_report_their_size() {
        let request = axum::http::Request::builder()
            .header("Content-Length", "7340032")
            .body(())
            .unwrap();
        let ctx = request_context(&request, None, Action::PhotoUpload, &[]);
        assert_eq!(ctx.cost.file_size_bytes, Some(7_340_032));

        let other = request_context(&request, None, Action::Message, &[]);
        assert_eq!(other.cost.file_size_bytes, None);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Middleware Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn admitted_request_reaches_handler_with_visibility() {
        let response = app(orchestrator())
            .oneshot(message_request(Some("alice")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"1");
    }

    #[tokio::test]
    async fn exhausted_bucket_returns_429_with_retry_after() {
        let orchestrator = orchestrator();
        for _ in 0..2 {
            let ok = app(orchestrator.clone())
                .oneshot(message_request(Some("alice")))
                .await
                .unwrap();
            assert_eq!(ok.status(), StatusCode::OK);
        }

        let denied = app(orchestrator)
            .oneshot(message_request(Some("alice")))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(denied.headers().get(header::RETRY_AFTER).unwrap(), "2");

        let body = axum::body::to_bytes(denied.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "rate_limited");
    }

    #[tokio::test]
    async fn blocked_device_returns_403_with_reason() {
        let orchestrator = orchestrator();
        let ctx = request_context(&message_request(None), None, Action::Message, &[]);
        let hash = orchestrator.fingerprints().fingerprint(&ctx);
        orchestrator
            .fingerprints()
            .block(&hash, "ban evasion", std::time::Duration::from_secs(300))
            .await
            .unwrap();

        let response = app(orchestrator).oneshot(message_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "device_blocked");
        assert_eq!(json["error"], "ban evasion");
    }

    #[tokio::test]
    async fn rotating_forwarded_header_does_not_escape_a_device_block() {
        let orchestrator = orchestrator();
        let socket = peer([203, 0, 113, 77]);
        let blocked_ctx = request_context(&message_request(None), Some(&socket), Action::Message, &[]);
        let hash = orchestrator.fingerprints().fingerprint(&blocked_ctx);
        orchestrator
            .fingerprints()
            .block(&hash, "ban evasion", std::time::Duration::from_secs(300))
            .await
            .unwrap();

        for spoofed in ["192.0.2.1", "192.0.2.2", "198.51.100.99"] {
            let mut request = message_request(None);
            request
                .headers_mut()
                .insert("X-Forwarded-For", HeaderValue::from_static(spoofed));
            request.extensions_mut().insert(socket);

            let response = app(orchestrator.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
    }
}
