//! JWT 认证模块
//!
//! REST 请求通过 `Authorization: Bearer <token>` 认证；持久连接的
//! `authenticate` 事件也可以携带同一令牌，由 [`IdentityVerifier`] 校验。

use application::{ApplicationError, IdentityVerifier};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, user_id: &UserId) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthorized(format!("token generation failed: {err}")))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<UserId, ApiError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                ApiError::unauthorized("not authorized")
            })?;

        UserId::parse(claims.sub).map_err(|_| ApiError::unauthorized("not authorized"))
    }

    /// 从 headers 中提取和验证 token
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("not authorized"))?;

        self.verify_token(token.trim())
    }
}

impl IdentityVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError> {
        self.verify_token(token)
            .map_err(|_| ApplicationError::Authentication)
    }
}

/// 已认证的调用者
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = state.jwt_service.extract_user_from_headers(&parts.headers)?;

        let profiles = state
            .user_directory
            .find_profiles(std::slice::from_ref(&user_id))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "failed to look up authenticated user");
                ApiError::from(ApplicationError::Store(err))
            })?;
        if profiles.is_empty() {
            debug!(user_id = %user_id, "token subject is not a known user");
            return Err(ApiError::unauthorized("not authorized"));
        }

        Ok(AuthUser(user_id))
    }
}
