use std::collections::HashMap;
use std::env;

use blobway_core::Result;

use crate::connection_string;

/// Default bound on retries for transient transport failures.
pub const DEFAULT_MAX_RETRIES: usize = 3;

const AZBLOB_ENDPOINT: &str = "AZBLOB_ENDPOINT";
const AZBLOB_ACCOUNT_NAME: &str = "AZBLOB_ACCOUNT_NAME";
const AZBLOB_ACCOUNT_KEY: &str = "AZBLOB_ACCOUNT_KEY";

/// Config carries all the configuration for the blob storage facade.
#[derive(Clone)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub struct Config {
    /// Blob service endpoint, e.g. `https://account.blob.core.windows.net`.
    pub endpoint: Option<String>,
    /// Storage account name.
    pub account_name: Option<String>,
    /// Storage account key, base64 encoded. Required for signing.
    pub account_key: Option<String>,
    /// Pre-issued shared-access-signature token. A client authorized this
    /// way can transfer and list but cannot issue further grants.
    pub sas_token: Option<String>,
    /// Maximum retries for transient transport failures.
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            account_name: None,
            account_key: None,
            sas_token: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    /// Parses a storage connection string into a configuration object.
    ///
    /// Construction fails fast on malformed input; no network call is made.
    ///
    /// An example of a connection string looks like:
    ///
    /// ```txt
    /// AccountName=mystorageaccount;
    /// AccountKey=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==;
    /// BlobEndpoint=https://mystorageaccount.blob.core.windows.net
    /// ```
    pub fn try_from_connection_string(conn_str: &str) -> Result<Self> {
        connection_string::parse(conn_str)
    }

    /// Load config values from the environment, keeping fields already set.
    pub fn from_env(mut self) -> Self {
        let envs = env::vars().collect::<HashMap<_, _>>();

        if let Some(v) = envs.get(AZBLOB_ENDPOINT) {
            self.endpoint = Some(v.to_string());
        }

        if let Some(v) = envs.get(AZBLOB_ACCOUNT_NAME) {
            self.account_name = Some(v.to_string());
        }

        if let Some(v) = envs.get(AZBLOB_ACCOUNT_KEY) {
            self.account_key = Some(v.to_string());
        }

        self
    }
}
