use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_QUERY: &str =
    "SELECT current_timestamp() as TIME, current_user() as USER, current_role() as ROLE;";

/// Run a single statement against Snowflake and print the result as CSV.
///
/// Every flag can also be set through the environment variable named after it,
/// e.g. `--snowflake.private.key.file` reads `SNOWFLAKE_PRIVATE_KEY_FILE`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Account identifier, not the username. See
    /// https://docs.snowflake.com/en/user-guide/admin-account-identifier
    #[arg(long = "snowflake.account", env = "SNOWFLAKE_ACCOUNT")]
    pub account: Option<String>,

    /// Host name [default: <account>.snowflakecomputing.com]
    #[arg(long = "snowflake.host", env = "SNOWFLAKE_HOST")]
    pub host: Option<String>,

    #[arg(long = "snowflake.port", env = "SNOWFLAKE_PORT", default_value_t = snowflake_api::DEFAULT_PORT)]
    pub port: u16,

    /// http or https
    #[arg(long = "snowflake.protocol", env = "SNOWFLAKE_PROTOCOL", default_value = "https")]
    pub protocol: String,

    #[arg(long = "snowflake.warehouse", env = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: Option<String>,

    #[arg(long = "snowflake.database", env = "SNOWFLAKE_DATABASE")]
    pub database: Option<String>,

    #[arg(long = "snowflake.schema", env = "SNOWFLAKE_SCHEMA")]
    pub schema: Option<String>,

    #[arg(long = "snowflake.role", env = "SNOWFLAKE_ROLE")]
    pub role: Option<String>,

    #[arg(long = "snowflake.user", env = "SNOWFLAKE_USER")]
    pub user: Option<String>,

    /// Cannot be combined with a private key file or an authenticator
    #[arg(long = "snowflake.password", env = "SNOWFLAKE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// PKCS#8 private key in PEM format. Cannot be combined with a password or an authenticator
    #[arg(long = "snowflake.private.key.file", env = "SNOWFLAKE_PRIVATE_KEY_FILE")]
    pub private_key_file: Option<PathBuf>,

    /// Passcode of an encrypted private key, not needed for unencrypted keys
    #[arg(
        long = "snowflake.private.key.passcode",
        env = "SNOWFLAKE_PRIVATE_KEY_PASSCODE",
        hide_env_values = true
    )]
    pub private_key_passcode: Option<String>,

    /// Authenticator type, one of: externalbrowser
    #[arg(long = "snowflake.authenticator", env = "SNOWFLAKE_AUTHENTICATOR")]
    pub authenticator: Option<String>,

    /// Maximum number of retries with backoff. -1 disables retries, 0 uses the default
    #[arg(
        long = "snowflake.max.retry.count",
        env = "SNOWFLAKE_MAX_RETRY_COUNT",
        default_value_t = 7,
        allow_negative_numbers = true
    )]
    pub max_retry_count: i32,

    /// Statement to execute
    #[arg(long, env = "SNOWFLAKE_QUERY", default_value = DEFAULT_QUERY)]
    pub query: String,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
