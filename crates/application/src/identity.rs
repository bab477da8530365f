use std::sync::Arc;

use domain::UserId;

use crate::error::ApplicationError;
use crate::events::AuthenticateData;

/// 校验不透明的身份令牌，返回稳定的用户标识
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, ApplicationError>;
}

/// 持久连接上 `authenticate` 事件的身份解析
pub struct ChannelAuthenticator {
    verifier: Arc<dyn IdentityVerifier>,
    require_token: bool,
}

impl ChannelAuthenticator {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, require_token: bool) -> Self {
        Self {
            verifier,
            require_token,
        }
    }

    pub fn resolve(&self, data: AuthenticateData) -> Result<UserId, ApplicationError> {
        match data {
            AuthenticateData::Token { token } => self.verifier.verify(&token),
            AuthenticateData::Identity(_) if self.require_token => {
                Err(ApplicationError::Authentication)
            }
            AuthenticateData::Identity(raw) => {
                UserId::parse(raw).map_err(|_| ApplicationError::Authentication)
            }
        }
    }
}
