use crate::AppState;
use crate::utils::auth::{bearer_token, validate_jwt};
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .map(|s| s.to_string());

    if let Some(token) = token {
        match validate_jwt(&token, &state.config.jwt_secret) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                return Ok(next.run(req).await);
            }
            Err(e) => tracing::debug!("rejected bearer token: {}", e),
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}
