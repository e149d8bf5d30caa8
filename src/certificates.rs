//! # Certificates
//!
//! Self-signed RSA server certificates for in-cluster TLS endpoints, and
//! expiry validation of stored certificates.
//!
//! Certificates are valid from one hour before `now` (clock drift between
//! nodes) until one year after it.

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

pub const RSA_KEY_BITS: usize = 2048;

pub fn validity_skew() -> Duration {
    Duration::hours(1)
}

pub fn lifetime() -> Duration {
    Duration::days(365)
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
    #[error("timestamp out of range: {0}")]
    Time(#[from] time::error::ComponentRange),
}

/// PEM-encoded certificate and private key
#[derive(Clone)]
pub struct GeneratedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub not_after: DateTime<Utc>,
}

impl std::fmt::Debug for GeneratedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCertificate")
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Subject and usages of a server certificate
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub common_name: String,
    pub sans: Vec<String>,
    pub key_usages: Vec<KeyUsagePurpose>,
    pub extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
}

impl CertificateRequest {
    /// Key encipherment, data encipherment, server auth
    pub fn server(common_name: impl Into<String>, sans: Vec<String>) -> Self {
        Self {
            common_name: common_name.into(),
            sans,
            key_usages: vec![
                KeyUsagePurpose::KeyEncipherment,
                KeyUsagePurpose::DataEncipherment,
            ],
            extended_key_usages: vec![ExtendedKeyUsagePurpose::ServerAuth],
        }
    }
}

fn to_offset(time: DateTime<Utc>) -> Result<OffsetDateTime, CertificateError> {
    Ok(OffsetDateTime::from_unix_timestamp(time.timestamp())?)
}

fn rsa_key_pair() -> Result<KeyPair, CertificateError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let pkcs8 = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    Ok(KeyPair::from_pkcs8_pem_and_sign_algo(
        &pkcs8,
        &rcgen::PKCS_RSA_SHA256,
    )?)
}

/// Generate a self-signed certificate for `request`
pub fn generate(
    now: DateTime<Utc>,
    request: &CertificateRequest,
) -> Result<GeneratedCertificate, CertificateError> {
    let key_pair = rsa_key_pair()?;

    let mut params = CertificateParams::new(request.sans.clone())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, request.common_name.clone());
    params.distinguished_name = dn;
    params.key_usages.clone_from(&request.key_usages);
    params
        .extended_key_usages
        .clone_from(&request.extended_key_usages);

    let not_after = now + lifetime();
    params.not_before = to_offset(now - validity_skew())?;
    params.not_after = to_offset(not_after)?;

    let cert = params.self_signed(&key_pair)?;
    debug!(common_name = %request.common_name, %not_after, "generated certificate");

    Ok(GeneratedCertificate {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        not_after,
    })
}

/// `notAfter` of the first certificate in `pem_bytes`
pub fn not_after(pem_bytes: &[u8]) -> Option<DateTime<Utc>> {
    let block = ::pem::parse(pem_bytes).ok()?;
    let (_, cert) = x509_parser::parse_x509_certificate(block.contents()).ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}

/// A certificate is valid while `now` is before `notAfter - renewal_threshold`.
/// Unparseable input is invalid.
pub fn validate(pem_bytes: &[u8], renewal_threshold: Duration, now: DateTime<Utc>) -> bool {
    not_after(pem_bytes).is_some_and(|expiry| now < expiry - renewal_threshold)
}
