use crate::auth::error::{AuthError, TokenError};
use crate::auth::types::{Claims, TokenPair, TokenType};
use crate::store::AccountId;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, warn};
use uuid::Uuid;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// 签发与校验访问令牌、刷新令牌
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        // 只接受 HS256，防止算法混淆
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        }
    }

    fn issue(
        &self,
        user_id: AccountId,
        username: &str,
        token_type: TokenType,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        debug!("为管理员 {} 生成 {} 令牌", user_id, token_type);
        let now = Utc::now();
        let expires_at = now
            + match token_type {
                TokenType::Access => self.access_ttl,
                TokenType::Refresh => self.refresh_ttl,
            };

        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            user_id,
            username: username.to_string(),
            token_type,
        };

        match encode(&Header::new(ALGORITHM), &claims, &self.encoding_key) {
            Ok(token) => Ok((token, expires_at)),
            Err(e) => {
                error!("为管理员 {} 生成令牌失败: {}", user_id, e);
                Err(AuthError::Internal(format!("签名令牌失败: {}", e)))
            }
        }
    }

    pub fn issue_access_token(
        &self,
        user_id: AccountId,
        username: &str,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue(user_id, username, TokenType::Access)
    }

    pub fn issue_refresh_token(
        &self,
        user_id: AccountId,
        username: &str,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue(user_id, username, TokenType::Refresh)
    }

    pub fn issue_pair(&self, user_id: AccountId, username: &str) -> Result<TokenPair, AuthError> {
        let (access_token, access_expires_at) = self.issue_access_token(user_id, username)?;
        let (refresh_token, refresh_expires_at) = self.issue_refresh_token(user_id, username)?;
        Ok(TokenPair {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                        TokenError::SignatureInvalid
                    }
                    _ => TokenError::Malformed,
                };
                debug!("令牌校验失败: {}", reason);
                reason
            })
    }

    fn validate_typed(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.validate(token)?;
        if claims.token_type != expected {
            warn!(
                "管理员 {} 使用了错误类型的令牌: {}",
                claims.user_id, claims.token_type
            );
            return Err(TokenError::WrongTokenType { expected });
        }
        Ok(claims)
    }

    pub fn validate_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_typed(token, TokenType::Access)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_typed(token, TokenType::Refresh)
    }
}
