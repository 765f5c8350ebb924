use bcrypt::{hash, verify, DEFAULT_COST};
use log::{debug, error, warn};
use sha2::{Digest, Sha256};

use super::error::AuthError;
use super::types::HashVersion;

/// bcrypt 工作因子，单次约 250ms
pub const HASH_COST: u32 = DEFAULT_COST;

pub struct PasswordHasher {
    pepper: String,
    cost: u32,
}

impl PasswordHasher {
    pub fn new(pepper: &str) -> Self {
        Self {
            pepper: pepper.to_string(),
            cost: HASH_COST,
        }
    }

    #[cfg(test)]
    pub fn with_cost(pepper: &str, cost: u32) -> Self {
        Self {
            pepper: pepper.to_string(),
            cost,
        }
    }

    // bcrypt 只使用前 72 字节，先做 SHA-256 得到固定 64 字节的十六进制串
    fn prehash(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(self.pepper.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        debug!("加密密码");
        hash(self.prehash(password), self.cost).map_err(|e| {
            error!("密码加密失败: {}", e);
            AuthError::Internal(format!("密码加密失败: {}", e))
        })
    }

    pub fn verify_password(
        &self,
        stored_hash: &str,
        password: &str,
        version: HashVersion,
    ) -> Result<(), AuthError> {
        match version {
            HashVersion::Legacy => {
                warn!("检测到旧版密码哈希，拒绝验证");
                Err(AuthError::LegacyHashFormat)
            }
            HashVersion::BcryptDirect => self.verify_bcrypt(stored_hash, password),
        }
    }

    fn verify_bcrypt(&self, stored_hash: &str, password: &str) -> Result<(), AuthError> {
        debug!("验证密码");
        match verify(self.prehash(password), stored_hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::InvalidCredentials),
            Err(e) => {
                error!("密码验证过程出错: {}", e);
                Err(AuthError::Internal("存储的密码哈希无法解析".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::with_cost("test-pepper", 4)
    }

    #[test]
    fn verify_accepts_the_hashed_password() {
        let hasher = hasher();
        for password in ["Sup3r$ecret", "a", "пароль-密码-🔑"] {
            let stored = hasher.hash_password(password).unwrap();
            assert!(hasher
                .verify_password(&stored, password, HashVersion::CURRENT)
                .is_ok());
        }
    }

    #[test]
    fn verify_rejects_other_passwords() {
        let hasher = hasher();
        let stored = hasher.hash_password("Sup3r$ecret").unwrap();

        for wrong in ["sup3r$ecret", "Sup3r$ecret ", "", "wrong"] {
            assert!(matches!(
                hasher.verify_password(&stored, wrong, HashVersion::CURRENT),
                Err(AuthError::InvalidCredentials)
            ));
        }
    }

    #[test]
    fn long_passwords_hash_and_do_not_truncate() {
        let hasher = hasher();
        let long = "x".repeat(128);
        let stored = hasher.hash_password(&long).unwrap();
        assert!(hasher
            .verify_password(&stored, &long, HashVersion::CURRENT)
            .is_ok());

        // 前 72 字节相同的两个密码不能互相通过
        let mut other = "x".repeat(127);
        other.push('y');
        assert!(matches!(
            hasher.verify_password(&stored, &other, HashVersion::CURRENT),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn pepper_is_part_of_the_hash() {
        let stored = hasher().hash_password("Sup3r$ecret").unwrap();
        let other = PasswordHasher::with_cost("another-pepper", 4);
        assert!(matches!(
            other.verify_password(&stored, "Sup3r$ecret", HashVersion::CURRENT),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn legacy_hashes_are_never_verified() {
        let hasher = hasher();
        let stored = hasher.hash_password("Sup3r$ecret").unwrap();
        assert!(matches!(
            hasher.verify_password(&stored, "Sup3r$ecret", HashVersion::Legacy),
            Err(AuthError::LegacyHashFormat)
        ));
    }

    #[test]
    fn corrupt_stored_hash_is_an_internal_error() {
        assert!(matches!(
            hasher().verify_password("not-a-bcrypt-hash", "pw", HashVersion::CURRENT),
            Err(AuthError::Internal(_))
        ));
    }
}
