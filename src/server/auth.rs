use std::sync::Arc;

use axum::{
    extract::{ Request, State },
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{ RateLimiter, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use log::{ debug, warn };
use url::form_urlencoded;

pub type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const API_KEY_HEADER: &str = "X-API-Key";
const API_KEY_QUERY: &str = "api_key";

fn provided_api_key(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if header.is_some() {
        return header;
    }
    let query = request.uri().query()?;
    form_urlencoded
        ::parse(query.as_bytes())
        .find(|(k, _)| k == API_KEY_QUERY)
        .map(|(_, v)| v.into_owned())
}

/// Rejects requests without the configured key. Open when no key is configured.
pub async fn api_key_middleware(
    State(required): State<Option<Arc<str>>>,
    request: Request,
    next: Next
) -> Result<Response, StatusCode> {
    let Some(required) = required else {
        return Ok(next.run(request).await);
    };

    match provided_api_key(&request) {
        Some(provided) if provided.as_str() == &*required => Ok(next.run(request).await),
        Some(_) => {
            warn!("{} {}: bad API key", request.method(), request.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            debug!("{} {}: missing API key", request.method(), request.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<GlobalLimiter>>,
    request: Request,
    next: Next
) -> Result<Response, StatusCode> {
    if limiter.check().is_err() {
        warn!("Global rate limit exceeded for {}. Rejecting request.", request.uri().path());
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}
