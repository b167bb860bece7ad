use std::fmt::{Debug, Formatter};

use blobway_core::utils::Redact;

use crate::Config;

/// Credential enum for the authorization modes the facade supports.
#[derive(Clone)]
pub enum Credential {
    /// Shared Key authorization with account name and key.
    ///
    /// This is the only mode capable of signing new shared-access grants.
    SharedKey {
        /// Storage account name.
        account_name: String,
        /// Storage account key, base64 encoded.
        account_key: String,
    },
    /// A pre-issued SAS (Shared Access Signature) token.
    SasToken {
        /// SAS token.
        token: String,
    },
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey {
                account_name,
                account_key,
            } => f
                .debug_struct("Credential::SharedKey")
                .field("account_name", &Redact::from(account_name))
                .field("account_key", &Redact::from(account_key))
                .finish(),
            Credential::SasToken { token } => f
                .debug_struct("Credential::SasToken")
                .field("token", &Redact::from(token))
                .finish(),
        }
    }
}

impl Credential {
    /// Create a new credential with shared key authorization.
    pub fn with_shared_key(account_name: &str, account_key: &str) -> Self {
        Self::SharedKey {
            account_name: account_name.to_string(),
            account_key: account_key.to_string(),
        }
    }

    /// Create a new credential with SAS token authorization.
    pub fn with_sas_token(sas_token: &str) -> Self {
        Self::SasToken {
            token: sas_token.to_string(),
        }
    }

    /// Collect the credential a config carries, if any.
    ///
    /// A config without credentials is valid: requests go out unsigned,
    /// which works against public containers.
    pub(crate) fn from_config(config: &Config) -> Option<Self> {
        if let Some(token) = &config.sas_token {
            Some(Self::with_sas_token(token))
        } else if let (Some(name), Some(key)) = (&config.account_name, &config.account_key) {
            Some(Self::with_shared_key(name, key))
        } else {
            None
        }
    }

    /// Whether this credential can sign new shared-access grants.
    pub fn can_sign(&self) -> bool {
        match self {
            Credential::SharedKey {
                account_name,
                account_key,
            } => !account_name.is_empty() && !account_key.is_empty(),
            Credential::SasToken { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_shared_key_can_sign() {
        assert!(Credential::with_shared_key("account", "a2V5").can_sign());
        assert!(!Credential::with_shared_key("", "").can_sign());
        assert!(!Credential::with_sas_token("sv=2021-01-01&sig=abc").can_sign());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::with_shared_key("account", "Eby8vdM02xNOcqFlqUwJPLlm");
        let out = format!("{cred:?}");
        assert!(!out.contains("Eby8vdM02xNOcqFlqUwJPLlm"));
    }

    #[test]
    fn test_from_config_prefers_sas() {
        let config = Config {
            account_name: Some("account".to_string()),
            account_key: Some("a2V5".to_string()),
            sas_token: Some("sig=abc".to_string()),
            ..Default::default()
        };
        let cred = Credential::from_config(&config).unwrap();
        assert!(matches!(cred, Credential::SasToken { .. }));
    }
}
