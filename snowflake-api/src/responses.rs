use serde::Deserialize;

#[allow(clippy::large_enum_variant)]
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ExecResponse {
    Query(QueryExecResponse),
    Error(ExecErrorResponse), // last since essentially catch-all
}

#[allow(clippy::large_enum_variant)]
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum AuthResponse {
    Login(LoginResponse),
    Authenticator(AuthenticatorResponse),
    Error(AuthErrorResponse),
}

#[derive(Deserialize, Debug)]
pub struct BaseRestResponse<D> {
    // null for auth
    pub code: Option<String>,
    pub message: Option<String>,
    pub success: bool,
    pub data: D,
}

pub type QueryExecResponse = BaseRestResponse<QueryExecResponseData>;
pub type ExecErrorResponse = BaseRestResponse<Option<ExecErrorResponseData>>;
pub type AuthErrorResponse = BaseRestResponse<Option<serde_json::Value>>;
pub type AuthenticatorResponse = BaseRestResponse<AuthenticatorResponseData>;
pub type LoginResponse = BaseRestResponse<LoginResponseData>;
// Data should be always `null` on successful close session and abort responses
pub type EmptyResponse = BaseRestResponse<Option<serde_json::Value>>;

impl<D> BaseRestResponse<D> {
    /// Error code and message, whichever the server filled in
    pub fn error_parts(&self) -> (String, String) {
        (
            self.code.clone().unwrap_or_default(),
            self.message.clone().unwrap_or_default(),
        )
    }
}

impl ExecErrorResponse {
    pub fn error_code(&self) -> String {
        self.data
            .as_ref()
            .map(|d| d.error_code.clone())
            .or_else(|| self.code.clone())
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecErrorResponseData {
    pub error_code: String,
}

#[derive(Deserialize, Debug)]
pub struct NameValueParameter {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    pub session_id: Option<i64>,
    pub token: String,
    pub master_token: Option<String>,
    pub server_version: Option<String>,
    #[serde(default)]
    pub parameters: Vec<NameValueParameter>,
    pub master_validity_in_seconds: Option<i64>,
    pub validity_in_seconds: Option<i64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorResponseData {
    pub token_url: Option<String>,
    pub sso_url: String,
    pub proof_key: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecResponseData {
    #[serde(default)]
    pub parameters: Vec<NameValueParameter>,
    pub rowtype: Vec<ExecResponseRowType>,
    // default for non-SELECT queries
    pub rowset: Option<serde_json::Value>,
    // only exists when binary response is given, eg Arrow
    // default for all SELECT queries
    // is base64-encoded Arrow IPC payload
    pub rowset_base64: Option<String>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub returned: i64,
    pub query_id: String,
    pub final_database_name: Option<String>,
    pub final_schema_name: Option<String>,
    pub final_warehouse_name: Option<String>,
    pub final_role_name: Option<String>,
    pub statement_type_id: Option<i64>,
    // if response is chunked
    #[serde(default)] // soft-default to empty Vec if not present
    pub chunks: Vec<ExecResponseChunk>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExecResponseRowType {
    pub name: String,
    #[serde(rename = "byteLength")]
    pub byte_length: Option<i64>,
    pub length: Option<i64>,
    #[serde(rename = "type")]
    pub type_: SnowflakeType,
    pub scale: Option<i64>,
    pub precision: Option<i64>,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnowflakeType {
    Fixed,
    Real,
    Text,
    Date,
    Variant,
    TimestampLtz,
    TimestampNtz,
    TimestampTz,
    Object,
    Binary,
    Time,
    Boolean,
    Array,
    // geography, vector, map and whatever comes next
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponseChunk {
    pub url: String,
    pub row_count: i32,
    pub uncompressed_size: i64,
}
