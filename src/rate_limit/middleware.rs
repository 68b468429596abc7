use super::limiter::RateLimiter;
use super::types::{Identity, Verdict};
use crate::error::RateLimiterError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header holding the proxy chain, client first
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Single-value proxy headers, tried in order after `X-Forwarded-For`
pub const ALTERNATE_IP_HEADERS: [&str; 2] = ["x-real-ip", "x-client-ip"];

/// Address used when no source yields one
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Admission filter state
#[derive(Clone)]
pub struct AdmissionFilter {
    /// The decision engine
    limiter: Arc<RateLimiter>,
    /// Header carrying the API credential
    credential_header: String,
}

impl AdmissionFilter {
    pub fn new(limiter: Arc<RateLimiter>, credential_header: impl Into<String>) -> Self {
        Self {
            limiter,
            credential_header: credential_header.into(),
        }
    }

    /// Build the identity a request is attributed to
    pub fn identity(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Identity {
        let credential = headers
            .get(self.credential_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        Identity::new(client_ip(headers, peer), credential)
    }

    /// Identity for an inbound request, using the peer address recorded by
    /// `into_make_service_with_connect_info`
    pub fn identity_of(&self, request: &Request) -> Identity {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);

        self.identity(request.headers(), peer)
    }

    /// Decide on an identity; `Ok` means the request may proceed
    pub async fn check(&self, identity: &Identity) -> Result<(), RateLimiterError> {
        match self.limiter.allow(identity).await? {
            Verdict::Permit => Ok(()),
            Verdict::Deny(kind) => Err(RateLimiterError::LimitExceeded { kind }),
        }
    }
}

/// Resolve the client address.
///
/// Order: the first `X-Forwarded-For` entry if it is a valid IP, then
/// `X-Real-IP` and `X-Client-IP` verbatim, then the peer address without
/// its port.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    for name in ALTERNATE_IP_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        if let Some(ip) = value {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

/// Axum middleware function for admission control
pub async fn rate_limit_middleware(
    State(filter): State<AdmissionFilter>,
    request: Request,
    next: Next,
) -> Response {
    let identity = filter.identity_of(&request);

    match filter.check(&identity).await {
        Ok(()) => {
            debug!(address = %identity.network_address, path = %request.uri().path(), "Request admitted");
            next.run(request).await
        }
        Err(RateLimiterError::LimitExceeded { kind }) => {
            warn!(
                kind = %kind,
                address = %identity.network_address,
                path = %request.uri().path(),
                "Request rejected by rate limiter"
            );
            RateLimiterError::LimitExceeded { kind }.into_response()
        }
        Err(e) => {
            error!(error = %e, "Admission check failed, rejecting request");
            e.into_response()
        }
    }
}
