//! Validation of the raw arguments into a config with exactly one way to authenticate.

use std::path::PathBuf;

use snowflake_api::{InvalidProtocol, Protocol};
use thiserror::Error;

use crate::args::Args;

const EXTERNAL_BROWSER: &str = "externalbrowser";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required flags: {}", .0.join(", "))]
    MissingFlags(Vec<&'static str>),

    #[error(
        "Must provide exactly one authentication method \
         (password provided: {password}, private key provided: {private_key}, authenticator provided: {authenticator})"
    )]
    ConflictingAuthentication {
        password: bool,
        private_key: bool,
        authenticator: bool,
    },

    #[error(transparent)]
    InvalidProtocol(#[from] InvalidProtocol),

    #[error("Invalid authenticator `{0}`, expected one of: externalbrowser")]
    InvalidAuthenticator(String),
}

/// The one credential the session is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
    BrowserDelegated,
}

/// Authenticator names are only checked once the required flags are known to be present
enum AuthInput {
    Resolved(Credentials),
    Authenticator(String),
}

/// Arguments that passed validation. Account and user are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    pub account: String,
    pub user: String,
    pub host: Option<String>,
    pub port: u16,
    pub protocol: Protocol,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
    pub credentials: Credentials,
    pub max_retry_count: i32,
}

/// Empty values, e.g. from `SNOWFLAKE_PASSWORD=`, count as not set
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn validate(args: &Args) -> Result<ValidatedConfig, ConfigurationError> {
    let account = non_empty(&args.account);
    let user = non_empty(&args.user);
    let password = non_empty(&args.password);
    let private_key_file = args
        .private_key_file
        .clone()
        .filter(|p| !p.as_os_str().is_empty());
    let authenticator = non_empty(&args.authenticator);

    let method = match (password, private_key_file, authenticator) {
        (None, None, None) => None,
        (Some(password), None, None) => Some(AuthInput::Resolved(Credentials::Password(password))),
        (None, Some(path), None) => Some(AuthInput::Resolved(Credentials::KeyFile {
            path,
            passphrase: non_empty(&args.private_key_passcode),
        })),
        (None, None, Some(name)) => Some(AuthInput::Authenticator(name)),
        (password, private_key_file, authenticator) => {
            return Err(ConfigurationError::ConflictingAuthentication {
                password: password.is_some(),
                private_key: private_key_file.is_some(),
                authenticator: authenticator.is_some(),
            });
        }
    };

    let mut missing = Vec::new();
    if account.is_none() {
        missing.push("snowflake.account");
    }
    if user.is_none() {
        missing.push("snowflake.user");
    }
    if method.is_none() {
        missing.push("authentication method (one of: snowflake.password, snowflake.private.key.file, or snowflake.authenticator)");
    }

    let (Some(account), Some(user), Some(method)) = (account, user, method) else {
        return Err(ConfigurationError::MissingFlags(missing));
    };

    let protocol = args.protocol.parse::<Protocol>()?;

    let credentials = match method {
        AuthInput::Resolved(credentials) => credentials,
        AuthInput::Authenticator(name) if name.eq_ignore_ascii_case(EXTERNAL_BROWSER) => {
            Credentials::BrowserDelegated
        }
        AuthInput::Authenticator(name) => {
            return Err(ConfigurationError::InvalidAuthenticator(name))
        }
    };

    Ok(ValidatedConfig {
        account,
        user,
        host: non_empty(&args.host),
        port: args.port,
        protocol,
        warehouse: non_empty(&args.warehouse),
        database: non_empty(&args.database),
        schema: non_empty(&args.schema),
        role: non_empty(&args.role),
        credentials,
        max_retry_count: args.max_retry_count,
    })
}
