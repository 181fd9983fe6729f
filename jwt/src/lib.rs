use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pkcs8::der::SecretDocument;
use pkcs8::{EncryptedPrivateKeyInfo, ObjectIdentifier, PrivateKeyInfo};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::EncodePublicKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::JwtError::JwtEncodingError;

/// rsaEncryption, RFC 8017 appendix A.1
const RSA_ALGORITHM_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("unable to read private key file `{0}`: {1}")]
    KeyFile(PathBuf, #[source] io::Error),

    #[error(transparent)]
    Pem(#[from] pkcs8::der::Error),

    #[error(transparent)]
    Pkcs8(#[from] pkcs8::Error),

    #[error(transparent)]
    Pkcs1(#[from] rsa::pkcs1::Error),

    #[error(transparent)]
    PublicKey(#[from] pkcs8::spki::Error),

    #[error("private key is encrypted, but no passphrase was provided")]
    MissingPassphrase,

    #[error("unsupported PEM block `{0}`, expected a PKCS#8 or PKCS#1 private key")]
    UnsupportedPem(String),

    #[error("private key is not an RSA key, algorithm: `{0}`")]
    NotRsaKey(String),

    #[error("unable to encode JWT: `{0}`")]
    JwtEncodingError(String),
}

/// Decoded RSA private key used to sign the login JWT.
///
/// The underlying key is zeroized when dropped, so keep it around only for
/// as long as the login takes.
pub struct PrivateKeyMaterial {
    key: RsaPrivateKey,
}

impl PrivateKeyMaterial {
    /// Read and decode a PEM private key from disk.
    /// The passphrase is only consulted for `ENCRYPTED PRIVATE KEY` blocks.
    pub fn from_pem_file<P: AsRef<Path>>(
        path: P,
        passphrase: Option<&str>,
    ) -> Result<Self, JwtError> {
        let path = path.as_ref();
        let pem = fs::read_to_string(path).map_err(|e| JwtError::KeyFile(path.to_owned(), e))?;

        Self::from_pem(&pem, passphrase)
    }

    /// Decode PKCS#8 (plain or PBES2-encrypted) or PKCS#1 PEM.
    pub fn from_pem(pem: &str, passphrase: Option<&str>) -> Result<Self, JwtError> {
        let (label, doc) = SecretDocument::from_pem(pem)?;

        let key = match label {
            "ENCRYPTED PRIVATE KEY" => {
                let passphrase = passphrase
                    .filter(|p| !p.is_empty())
                    .ok_or(JwtError::MissingPassphrase)?;
                let encrypted = EncryptedPrivateKeyInfo::try_from(doc.as_bytes())?;
                let decrypted = encrypted.decrypt(passphrase)?;
                rsa_from_pkcs8_der(decrypted.as_bytes())?
            }
            "PRIVATE KEY" => rsa_from_pkcs8_der(doc.as_bytes())?,
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(doc.as_bytes())?,
            other => return Err(JwtError::UnsupportedPem(other.to_string())),
        };

        Ok(PrivateKeyMaterial { key })
    }

    /// SHA-256 fingerprint of the DER-encoded public key, as registered in Snowflake
    /// with `ALTER USER ... SET RSA_PUBLIC_KEY`.
    pub fn public_key_fingerprint(&self) -> Result<String, JwtError> {
        let pubk = self.key.to_public_key().to_public_key_der()?;

        Ok(pubkey_fingerprint(pubk.as_bytes()))
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("key", &"<redacted>")
            .finish()
    }
}

fn rsa_from_pkcs8_der(der: &[u8]) -> Result<RsaPrivateKey, JwtError> {
    let info = PrivateKeyInfo::try_from(der)?;
    if info.algorithm.oid != RSA_ALGORITHM_OID {
        return Err(JwtError::NotRsaKey(info.algorithm.oid.to_string()));
    }

    Ok(RsaPrivateKey::try_from(info)?)
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    #[serde(with = "jwt_numeric_date")]
    iat: OffsetDateTime,
    #[serde(with = "jwt_numeric_date")]
    exp: OffsetDateTime,
}

impl Claims {
    /// JWT timestamps are whole seconds, strip the sub-second part so that the token
    /// is equal to itself after a serialization round.
    pub fn new(iss: String, sub: String, iat: OffsetDateTime, exp: OffsetDateTime) -> Self {
        let iat = iat.replace_nanosecond(0).unwrap_or(iat);
        let exp = exp.replace_nanosecond(0).unwrap_or(exp);

        Self { iss, sub, iat, exp }
    }
}

mod jwt_numeric_date {
    //! Custom serialization of OffsetDateTime as an RFC 7519 "NumericDate"
    use serde::{self, Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    /// Serializes an OffsetDateTime to a Unix timestamp (seconds since 1970/1/1T00:00:00T)
    pub fn serialize<S>(date: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(date.unix_timestamp())
    }

    /// Attempts to deserialize an i64 and use as a Unix timestamp
    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        OffsetDateTime::from_unix_timestamp(i64::deserialize(deserializer)?)
            .map_err(|_| serde::de::Error::custom("invalid Unix timestamp value"))
    }
}

fn pubkey_fingerprint(pubkey: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pubkey);

    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Sign a key-pair authentication token, valid for one hour.
pub fn generate_jwt_token(
    private_key: &PrivateKeyMaterial,
    // Snowflake expects uppercase <account identifier>.<username>
    full_identifier: &str,
) -> Result<String, JwtError> {
    let iss = format!(
        "{}.SHA256:{}",
        full_identifier,
        private_key.public_key_fingerprint()?
    );

    let iat = OffsetDateTime::now_utc();
    let exp = iat + Duration::hours(1);

    let claims = Claims::new(iss, full_identifier.to_owned(), iat, exp);
    let der = private_key.key.to_pkcs1_der()?;
    let ek = EncodingKey::from_rsa_der(der.as_bytes());

    encode(&Header::new(Algorithm::RS256), &claims, &ek).map_err(|e| JwtEncodingError(e.to_string()))
}
