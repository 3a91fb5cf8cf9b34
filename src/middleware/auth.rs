use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use axum::{Json, RequestPartsExt};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::router::PulseState;

fn key_matches(candidate: &str, expected: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

fn unauthorized(reason: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized", "reason": reason})),
    )
        .into_response()
}

/// Ensure a dashboard request carries the pulse key.
/// Accepts either:
/// - Header: `x-api-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), Response> {
    if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && key_matches(hv, expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && key_matches(token, expected)
        {
            return Ok(());
        }
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && key_matches(&v, expected) {
                return Ok(());
            }
        }
    }

    Err(unauthorized("invalid or missing key"))
}

/// Dashboard routes: manual sync, backfill, funnel.
#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl FromRequestParts<PulseState> for RequireKeyAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PulseState,
    ) -> Result<Self, Self::Rejection> {
        ensure_authorized(&parts.headers, parts.uri.query(), &state.pulse_key)?;
        Ok(Self)
    }
}

/// Scheduler route: `Authorization: Bearer <cron_secret>`. Rejects everything
/// while no secret is configured.
#[derive(Debug, Clone, Copy)]
pub struct RequireCronSecret;

impl FromRequestParts<PulseState> for RequireCronSecret {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PulseState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.cron_secret.as_deref() else {
            warn!("cron trigger rejected: no cron secret configured");
            return Err(unauthorized("cron secret not configured"));
        };
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| unauthorized("missing bearer token"))?;
        if !key_matches(bearer.token(), expected) {
            warn!("cron trigger rejected: secret mismatch");
            return Err(unauthorized("invalid cron secret"));
        }
        Ok(Self)
    }
}
