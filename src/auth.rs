use axum::{
    Json, RequestPartsExt,
    extract::{FromRequestParts, State},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    extract::cookie::{Cookie, CookieJar, SameSite},
    headers::{Authorization, authorization::Bearer},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::db::models::{NewUserProfile, User};
use crate::db::queries;
use crate::error::ApiError;

/// HTTP-only cookie carrying the signed token (token mode).
pub const TOKEN_COOKIE: &str = "token";
/// Plain cookie carrying the email (cookie-identity mode).
pub const IDENTITY_COOKIE: &str = "user_email";
/// Header equivalent of the identity cookie.
const IDENTITY_HEADER: &str = "x-user-email";

const SESSION_TTL_DAYS: i64 = 7;
const BCRYPT_COST: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id, hex-encoded.
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

/// Session strategy, selected once at startup by the presence of a signing
/// secret. Every protected request resolves identity through exactly one
/// of these; no handler branches on the mode itself.
pub enum SessionAuth {
    /// Signed, time-limited token bound to user id + email.
    Token {
        encoding: EncodingKey,
        decoding: DecodingKey,
    },
    /// Fallback without a secret: the email cookie is the session proof
    /// and is resolved against the store on every request.
    CookieIdentity,
}

impl SessionAuth {
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => {
                tracing::info!("session mode: signed token");
                SessionAuth::Token {
                    encoding: EncodingKey::from_secret(secret.as_bytes()),
                    decoding: DecodingKey::from_secret(secret.as_bytes()),
                }
            }
            None => {
                tracing::info!("session mode: identity cookie (no JWT_SECRET configured)");
                SessionAuth::CookieIdentity
            }
        }
    }

    /// Issue the session proof after a successful login or registration.
    /// Returns the updated jar and, in token mode, the token for clients
    /// that prefer the Authorization header over cookies.
    pub fn issue(
        &self,
        id: ObjectId,
        email: &str,
        jar: CookieJar,
    ) -> Result<(CookieJar, Option<String>), ApiError> {
        match self {
            SessionAuth::Token { encoding, .. } => {
                let token = sign_token(encoding, id, email)?;
                let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
                    .http_only(true)
                    .same_site(SameSite::Lax)
                    .path("/")
                    .build();
                Ok((jar.add(cookie), Some(token)))
            }
            SessionAuth::CookieIdentity => {
                let cookie = Cookie::build((IDENTITY_COOKIE, email.to_string()))
                    .http_only(false)
                    .same_site(SameSite::Lax)
                    .path("/")
                    .build();
                Ok((jar.add(cookie), None))
            }
        }
    }
}

fn sign_token(key: &EncodingKey, id: ObjectId, email: &str) -> Result<String, ApiError> {
    let exp = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).timestamp();
    let claims = Claims {
        sub: id.to_hex(),
        email: email.to_string(),
        exp: exp as usize,
    };
    jsonwebtoken::encode(&Header::default(), &claims, key)
        .map_err(|err| ApiError::Internal(err.into()))
}

fn verify_token(key: &DecodingKey, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = jsonwebtoken::decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))?;
    Ok(data.claims)
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|err| ApiError::Internal(err.into()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash).map_err(|err| ApiError::Internal(err.into()))
}

/// Resolved identity for a protected request. This is the only id that
/// ever scopes a store query; ids arriving in request bodies are never
/// trusted for ownership.
pub struct AuthUser {
    pub id: ObjectId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let jar = CookieJar::from_headers(&parts.headers);

        match &*state.sessions {
            SessionAuth::Token { decoding, .. } => {
                let token = match jar.get(TOKEN_COOKIE) {
                    Some(cookie) => cookie.value().to_string(),
                    None => {
                        let TypedHeader(Authorization(bearer)) = parts
                            .extract::<TypedHeader<Authorization<Bearer>>>()
                            .await
                            .map_err(|_| ApiError::Unauthenticated)?;
                        bearer.token().to_string()
                    }
                };

                // Expired and tampered tokens rank the same as absent ones.
                let claims = verify_token(decoding, &token).map_err(|err| {
                    tracing::debug!("session token rejected: {err}");
                    ApiError::Unauthenticated
                })?;
                let id =
                    ObjectId::parse_str(&claims.sub).map_err(|_| ApiError::Unauthenticated)?;
                Ok(AuthUser { id })
            }
            SessionAuth::CookieIdentity => {
                let email = jar
                    .get(IDENTITY_COOKIE)
                    .map(|cookie| cookie.value().to_string())
                    .or_else(|| {
                        parts
                            .headers
                            .get(IDENTITY_HEADER)
                            .and_then(|value| value.to_str().ok())
                            .map(|value| value.to_string())
                    })
                    .ok_or(ApiError::Unauthenticated)?;

                let user = queries::find_user_by_email(&state.db, &email)
                    .await?
                    .ok_or(ApiError::Unauthenticated)?;
                let id = user.id.ok_or_else(|| {
                    ApiError::Internal(anyhow::anyhow!("user record for {email} has no id"))
                })?;
                Ok(AuthUser { id })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub hospital_name: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub user: SessionUser,
}

/// Redacted user record in the shape the client consumes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            full_name: user.full_name,
            doctor_id: user.doctor_id,
            email: user.email,
            hospital_name: user.hospital_name,
            area: user.area,
            profile_picture: user.profile_picture,
            created_at: user.created_at.to_chrono().to_rfc3339(),
            updated_at: user.updated_at.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserView,
}

fn require_credentials<'a>(
    email: Option<&'a str>,
    password: Option<&'a str>,
) -> Result<(&'a str, &'a str), ApiError> {
    match (email, password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            Ok((email, password))
        }
        _ => Err(ApiError::validation("Email and password are required")),
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let (email, password) = require_credentials(body.email.as_deref(), body.password.as_deref())?;

    // Friendly pre-check; the unique index still decides races.
    if queries::find_user_by_email(&state.db, email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = hash_password(password)?;
    let user = User::new(
        email.to_string(),
        password_hash,
        NewUserProfile {
            full_name: body.full_name.clone(),
            doctor_id: body.doctor_id,
            hospital_name: body.hospital_name,
            area: body.area,
        },
    );

    let id = queries::create_user(&state.db, &user).await?;
    tracing::info!("user registered: {}", id.to_hex());

    let (jar, token) = state.sessions.issue(id, email, jar)?;
    Ok((
        jar,
        Json(SessionResponse {
            token,
            user: SessionUser {
                id: id.to_hex(),
                email: email.to_string(),
                full_name: body.full_name,
            },
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), ApiError> {
    let (email, password) = require_credentials(body.email.as_deref(), body.password.as_deref())?;

    let Some(user) = queries::find_user_by_email(&state.db, email).await? else {
        // Observable server-side, erased in the response.
        tracing::warn!("login failed: no user for {email}");
        return Err(ApiError::InvalidCredentials);
    };

    let id = user.id.ok_or_else(|| {
        ApiError::Internal(anyhow::anyhow!("user record for {email} has no id"))
    })?;

    // A persisted user without a credential is a data-integrity fault, not
    // a wrong password.
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "user record {} has no stored credential",
            id.to_hex()
        )));
    };

    if !verify_password(password, hash)? {
        tracing::warn!("login failed: password mismatch for {email}");
        return Err(ApiError::InvalidCredentials);
    }

    let (jar, token) = state.sessions.issue(id, email, jar)?;
    Ok((
        jar,
        Json(SessionResponse {
            token,
            user: SessionUser {
                id: id.to_hex(),
                email: user.email,
                full_name: user.full_name,
            },
        }),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = queries::find_user_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(MeResponse { user: user.into() }))
}

/// Clears both possible cookie names regardless of the active mode, and
/// succeeds even when no session was ever established.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar
        .remove(Cookie::build((TOKEN_COOKIE, "")).path("/").build())
        .remove(Cookie::build((IDENTITY_COOKIE, "")).path("/").build());
    (jar, Json(json!({ "ok": true })))
}
