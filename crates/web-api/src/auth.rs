//! JWT 认证模块
//!
//! 提供 JWT token 生成、验证，以及从请求头提取已认证用户的提取器。

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub id: i64,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    Expired,
    #[error("token subject is not a valid user id")]
    InvalidSubject,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);

        Self {
            config,
            encoding_key,
            decoding_key,
            validation,
        }
    }

    /// 签发 token，有效期取配置
    pub fn generate_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);
        self.encode_claims(&Claims {
            id: user_id.value(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|err| AuthError::InvalidToken(format!("token generation failed: {err}")))
    }

    /// 验证 token 并返回其中的用户身份
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(err.to_string()),
            })?;

        UserId::parse(claims.id).map_err(|_| AuthError::InvalidSubject)
    }

    /// 从 headers 中提取和验证 Bearer token
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, AuthError> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header);
        self.verify(token)
    }
}

/// 已认证的调用方
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.jwt_service.authenticate(&parts.headers) {
            Ok(user_id) => Ok(AuthUser(user_id)),
            Err(err) => {
                tracing::warn!(error = %err, path = %parts.uri.path(), "rejected unauthenticated request");
                Err(err.into())
            }
        }
    }
}
