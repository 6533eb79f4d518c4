/*
 * This file is part of the Obvia ERP.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use crate::common::ConfigProvider;
use crate::common::dto::GeneralError;
use crate::common::error::FriendlyError;
use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::Level;
use uuid::Uuid;

/// Name of the cookie carrying the tenant session (spec S6 "Tenant-session"
/// surface). Not a JWT: the value is `{tenant_id}.{hmac}`, verified against
/// `secrets.session_signing_key` — JWTs in this crate are reserved for the
/// SSO login-token minted in `instances::secret_mint`.
pub(crate) const SESSION_COOKIE_NAME: &str = "tenant_session";

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn sign_session(tenant_id: Uuid, key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(tenant_id.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{tenant_id}.{sig}")
}

fn verify_session(token: &str, key: &[u8]) -> Option<Uuid> {
    let (id_part, sig_part) = token.split_once('.')?;
    let tenant_id = Uuid::parse_str(id_part).ok()?;
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(tenant_id.as_bytes());
    let given_sig = URL_SAFE_NO_PAD.decode(sig_part).ok()?;
    mac.verify_slice(&given_sig).ok()?;
    Some(tenant_id)
}

pub(crate) fn session_cookie(tenant_id: Uuid, key: &[u8]) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, sign_session(tenant_id, key)))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(axum_extra::extract::cookie::SameSite::Lax)
        .build()
}

pub(crate) fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::from(SESSION_COOKIE_NAME);
    cookie.set_path("/");
    cookie
}

fn unauthenticated(message: &str) -> Response {
    FriendlyError::<GeneralError>::user_facing(
        Level::WARN,
        StatusCode::UNAUTHORIZED,
        file!(),
        GeneralError {
            message: message.to_string(),
        },
    )
    .into_response()
}

/// Resolves the signed-in tenant from the session cookie (spec S6). Any
/// missing/unverifiable cookie is an unauthenticated request, not a 500.
pub struct TenantSession {
    pub tenant_id: Uuid,
}

impl<S> FromRequestParts<S> for TenantSession
where
    S: ConfigProvider + Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = state.config();
        let key = config.secrets().session_signing_key();
        let tenant_id = CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE_NAME)
            .and_then(|c| verify_session(c.value(), key.as_bytes()));

        match tenant_id {
            Some(tenant_id) => Ok(TenantSession { tenant_id }),
            None => Err(unauthenticated("not signed in")),
        }
    }
}

/// Validates the shared-secret `X-Admin-Token` header the `/admin/*`
/// surface (spec S6 "Admin") is gated behind — there is no admin user row.
pub struct AdminToken;

impl<S> FromRequestParts<S> for AdminToken
where
    S: ConfigProvider + Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-admin-token")
            .and_then(|v| v.to_str().ok());

        match provided {
            Some(token) if token == state.config().admin().token() => Ok(AdminToken),
            _ => Err(unauthenticated("missing or invalid admin token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_signed_session() {
        let key = b"test-session-signing-key";
        let tenant_id = Uuid::new_v4();
        let token = sign_session(tenant_id, key);
        assert_eq!(verify_session(&token, key), Some(tenant_id));
    }

    #[test]
    fn rejects_a_tampered_session() {
        let key = b"test-session-signing-key";
        let other_id = Uuid::new_v4();
        let token = sign_session(Uuid::new_v4(), key);
        let (_, sig) = token.split_once('.').unwrap();
        let tampered = format!("{other_id}.{sig}");
        assert_eq!(verify_session(&tampered, key), None);
    }

    #[test]
    fn rejects_a_different_key() {
        let tenant_id = Uuid::new_v4();
        let token = sign_session(tenant_id, b"key-one");
        assert_eq!(verify_session(&token, b"key-two"), None);
    }
}
