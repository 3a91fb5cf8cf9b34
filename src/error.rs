use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PulseError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("token cipher error: {0}")]
    Cipher(String),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    /// The identity provider rejected the refresh; `error` is its message verbatim.
    #[error("{error}")]
    Oauth2Server { error: String },

    #[error("Google API error {code}: {message}")]
    GoogleApi { code: u16, message: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl PulseError {
    /// The remote resource already exists (HTTP 409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, PulseError::GoogleApi { code: 409, .. })
    }

    /// The identity provider rejected the grant itself, not the transport.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, PulseError::Oauth2Server { .. })
    }
}

/// Errors worth another attempt after a short backoff.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for PulseError {
    fn is_retryable(&self) -> bool {
        match self {
            PulseError::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.is_server_error() || s == reqwest::StatusCode::TOO_MANY_REQUESTS
                    })
            }
            PulseError::Oauth2Token(_) => true,
            PulseError::GoogleApi { code, .. } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for PulseError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => PulseError::Oauth2Server {
                error: err
                    .error_description()
                    .cloned()
                    .unwrap_or_else(|| err.error().to_string()),
            },
            RequestTokenError::Request(req_e) => {
                PulseError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => PulseError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => PulseError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for PulseError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            PulseError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: what,
                },
            ),
            PulseError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: msg,
                },
            ),
            PulseError::Oauth2Token(_) | PulseError::Oauth2Server { .. } => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody {
                    code: "UNAUTHORIZED".to_string(),
                    message: "Authentication error.".to_string(),
                },
            ),
            PulseError::Reqwest(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream service is unavailable.".to_string(),
                },
            ),
            PulseError::GoogleApi { code, .. } => {
                let (err_code, msg) = match code {
                    429 => ("RATE_LIMIT", "Upstream rate limit exceeded."),
                    401 => ("UNAUTHORIZED", "Upstream authentication failed."),
                    403 => ("FORBIDDEN", "Upstream permission denied."),
                    _ => ("UPSTREAM_ERROR", "An upstream error occurred."),
                };
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorBody {
                        code: err_code.to_string(),
                        message: msg.to_string(),
                    },
                )
            }
            PulseError::Config(_)
            | PulseError::UrlParse(_)
            | PulseError::Json(_)
            | PulseError::Csv(_)
            | PulseError::Cipher(_)
            | PulseError::DatabaseError(_)
            | PulseError::RactorError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

/// Error envelope returned by every Google API on non-2xx responses.
#[derive(Deserialize, Debug)]
pub struct GoogleApiError {
    pub error: GoogleApiErrorBody,
}

#[derive(Deserialize, Debug)]
pub struct GoogleApiErrorBody {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GoogleApiError {
    /// Decode a failed response body, falling back to the raw text when the
    /// envelope is absent.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> PulseError {
        match serde_json::from_str::<GoogleApiError>(body) {
            Ok(parsed) => PulseError::GoogleApi {
                code: parsed.error.code,
                message: parsed.error.message,
            },
            Err(_) => PulseError::GoogleApi {
                code: status.as_u16(),
                message: if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body.trim().to_string()
                },
            },
        }
    }
}
