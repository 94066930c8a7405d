use axum::{
    extract::{ Request, State },
    http::{ HeaderMap, StatusCode },
    middleware::Next,
    response::{ IntoResponse, Response },
    Json,
};
use chrono::Utc;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use hmac::{ Hmac, Mac };
use log::warn;
use sha2::Sha256;
use std::num::NonZeroU32;
use thiserror::Error;

use super::api::AppState;
use crate::models::api::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

pub type RequestLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const TS_HEADER: &str = "x-api-ts";
pub const SIGN_HEADER: &str = "x-api-sign";
/// Accepted clock skew, in seconds.
pub const MAX_SKEW_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing ts/sig")] Missing,
    #[error("timestamp out of range")] Expired,
    #[error("bad signature")] BadSignature,
}

pub fn new_limiter(per_second: u32) -> RequestLimiter {
    let quota = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(quota))
}

/// Hex HMAC-SHA256 of `ts` under `secret`, as clients send it.
pub fn sign(secret: &str, ts: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(headers: &HeaderMap, secret: &str, now: i64) -> Result<(), AuthError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let (ts, sig) = match (header(TS_HEADER), header(SIGN_HEADER)) {
        (Some(ts), Some(sig)) => (ts, sig),
        _ => return Err(AuthError::Missing),
    };

    let ts_i: i64 = ts.parse().map_err(|_| AuthError::Expired)?;
    if (now - ts_i).abs() > MAX_SKEW_SECS {
        return Err(AuthError::Expired);
    }

    let sig_bytes = hex::decode(sig).map_err(|_| AuthError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&sig_bytes).map_err(|_| AuthError::BadSignature)
}

fn reject(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

pub async fn require_signature(
    State(state): State<AppState>,
    req: Request,
    next: Next
) -> Response {
    if let Some(secret) = state.api_key.as_deref().filter(|k| !k.is_empty()) {
        if let Err(e) = verify_signature(req.headers(), secret, Utc::now().timestamp()) {
            warn!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
            return reject(StatusCode::UNAUTHORIZED, e.to_string());
        }
    }
    next.run(req).await
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!("Rate limit exceeded on {}", req.uri().path());
        return reject(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_string());
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "s3cret";

    fn headers(ts: &str, sig: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(TS_HEADER, HeaderValue::from_str(ts).unwrap());
        h.insert(SIGN_HEADER, HeaderValue::from_str(sig).unwrap());
        h
    }

    #[test]
    fn accepts_fresh_signature() {
        let sig = sign(SECRET, "1700000000").unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(verify_signature(&headers("1700000000", &sig), SECRET, 1700000100), Ok(()));
    }

    #[test]
    fn rejects_stale_wrong_or_missing() {
        let sig = sign(SECRET, "1700000000").unwrap();
        assert_eq!(
            verify_signature(&headers("1700000000", &sig), SECRET, 1700000301),
            Err(AuthError::Expired)
        );
        assert_eq!(
            verify_signature(&headers("1700000000", &sig), "other", 1700000000),
            Err(AuthError::BadSignature)
        );
        assert_eq!(
            verify_signature(&headers("1700000000", "zz"), SECRET, 1700000000),
            Err(AuthError::BadSignature)
        );
        assert_eq!(verify_signature(&HeaderMap::new(), SECRET, 0), Err(AuthError::Missing));
    }

    #[test]
    fn limiter_allows_burst_of_quota() {
        let limiter = new_limiter(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
        assert!(new_limiter(0).check().is_ok());
    }
}
