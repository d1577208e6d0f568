use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::state::AppState;

/// Puts the claims of a valid bearer token into the request extensions, where the
/// GraphQL handler picks them up. Requests without a usable token pass through
/// anonymously; resolvers that need an identity reject them.
pub async fn jwt_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if let Some(token) = token {
        match state.jwt_service().verify_token(token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => debug!("ignoring invalid bearer token: {}", e),
        }
    }

    next.run(request).await
}
