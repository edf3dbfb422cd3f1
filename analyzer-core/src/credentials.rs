use crate::error::{CoreError, CredentialsError};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

pub const REDDIT_CLIENT_ID_KEY: &str = "REDDIT_CLIENT_ID";
pub const REDDIT_CLIENT_SECRET_KEY: &str = "REDDIT_CLIENT_SECRET";
pub const MODEL_API_KEY_KEY: &str = "MODEL_API_KEY";

/// A source of named secret bundles.
pub trait SecretStore {
    async fn get_secret(&self, secret_name: &str) -> Result<HashMap<String, String>, CoreError>;
}

/// Reads `<dir>/<secret_name>.json`, a flat JSON object of string values.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SecretStore for FileSecretStore {
    async fn get_secret(&self, secret_name: &str) -> Result<HashMap<String, String>, CoreError> {
        let path = self.dir.join(format!("{secret_name}.json"));
        info!("Attempting to retrieve secret: {}", secret_name);

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::Credentials(CredentialsError::SecretNotFound {
                    secret: secret_name.to_string(),
                })
            } else {
                CoreError::Io(e)
            }
        })?;

        parse_secret_string(secret_name, &contents)
    }
}

/// Reads the bundle keys straight from the process environment.
pub struct EnvSecretStore {
    keys: Vec<String>,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self {
            keys: [REDDIT_CLIENT_ID_KEY, REDDIT_CLIENT_SECRET_KEY, MODEL_API_KEY_KEY]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, secret_name: &str) -> Result<HashMap<String, String>, CoreError> {
        info!("Reading secret {} from environment", secret_name);
        Ok(self
            .keys
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect())
    }
}

/// Parses a secret string into a key-value bundle.
pub fn parse_secret_string(
    secret_name: &str,
    contents: &str,
) -> Result<HashMap<String, String>, CoreError> {
    serde_json::from_str::<HashMap<String, String>>(contents).map_err(|e| {
        CoreError::Credentials(CredentialsError::InvalidFormat {
            secret: secret_name.to_string(),
            reason: e.to_string(),
        })
    })
}

/// The credentials a run needs, validated out of a secret bundle.
#[derive(Clone)]
pub struct Credentials {
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub model_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("reddit_client_id", &self.reddit_client_id)
            .field("reddit_client_secret", &"<redacted>")
            .field("model_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_bundle(
        secret_name: &str,
        bundle: &HashMap<String, String>,
    ) -> Result<Self, CredentialsError> {
        let require = |key: &str| {
            bundle
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| CredentialsError::MissingKey {
                    secret: secret_name.to_string(),
                    key: key.to_string(),
                })
        };

        Ok(Self {
            reddit_client_id: require(REDDIT_CLIENT_ID_KEY)?,
            reddit_client_secret: require(REDDIT_CLIENT_SECRET_KEY)?,
            model_api_key: require(MODEL_API_KEY_KEY)?,
        })
    }

    pub async fn fetch<S: SecretStore>(store: &S, secret_name: &str) -> Result<Self, CoreError> {
        let bundle = store.get_secret(secret_name).await?;
        let credentials = Self::from_bundle(secret_name, &bundle)?;
        info!("Credentials for secret {} obtained", secret_name);
        Ok(credentials)
    }
}
