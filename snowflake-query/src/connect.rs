use snowflake_api::{AuthType, ConnectionConfig, PrivateKeyMaterial, SnowflakeApi};
use snowflake_jwt::JwtError;
use tokio::io::AsyncBufRead;

use crate::credentials::{Credentials, ValidatedConfig};
use crate::Error;

/// Turn the validated arguments into a driver config.
/// Key files are read and decrypted here, nothing else touches the filesystem.
pub fn connection_config(validated: ValidatedConfig) -> Result<ConnectionConfig, JwtError> {
    let auth = match validated.credentials {
        Credentials::Password(password) => AuthType::Password(password),
        Credentials::KeyFile { path, passphrase } => {
            tracing::debug!(path = %path.display(), "Reading private key");
            let key = PrivateKeyMaterial::from_pem_file(&path, passphrase.as_deref())?;
            AuthType::KeyPair(key)
        }
        Credentials::BrowserDelegated => AuthType::ExternalBrowser,
    };

    let mut config = ConnectionConfig::new(&validated.account, &validated.user, auth);
    config.host = validated.host;
    config.port = validated.port;
    config.protocol = validated.protocol;
    config.warehouse = validated.warehouse;
    config.database = validated.database;
    config.schema = validated.schema;
    config.role = validated.role;
    config.max_retry_count = validated.max_retry_count;

    Ok(config)
}

/// Open a session. Browser sign-in reads the pasted redirect URL from `input`.
pub async fn connect<R>(config: ConnectionConfig, input: R) -> Result<SnowflakeApi, Error>
where
    R: AsyncBufRead + Unpin,
{
    tracing::info!(dsn = %config.dsn(), "Connecting to snowflake");

    SnowflakeApi::connect_with_input(config, input)
        .await
        .map_err(Error::Connection)
}
