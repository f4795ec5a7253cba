use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    config::RefreshCookieConfig,
    dtos::{ApiResponse, RegisterRequest, RegisterResponse},
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Register a new account.
///
/// 201 with the identity summary and both tokens; the refresh token is also
/// set as an HttpOnly cookie.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<RegisterResponse>), ServiceError> {
    let outcome = state.registration.register(req).await?;

    let jar = jar.add(refresh_cookie(
        &state.config.cookie,
        outcome.tokens.refresh_token.clone(),
    ));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisterResponse {
            response: ApiResponse::ok(),
            user: outcome.user,
            access_token: outcome.tokens.access_token,
            refresh_token: outcome.tokens.refresh_token,
        }),
    ))
}

fn refresh_cookie(config: &RefreshCookieConfig, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(config.max_age_days))
        .build()
}
