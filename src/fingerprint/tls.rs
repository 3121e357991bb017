//! TLS fingerprint configuration (JA3/JA4 surface).

use boring::ssl::{SslConnectorBuilder, SslVersion};

use crate::error::{Error, Result};

/// Chrome cipher suites in exact order.
pub const CHROME_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
];

/// Chrome signature algorithms.
pub const CHROME_SIGNATURE_ALGORITHMS: &[&str] = &[
    "ecdsa_secp256r1_sha256",
    "rsa_pss_rsae_sha256",
    "rsa_pkcs1_sha256",
    "ecdsa_secp384r1_sha384",
    "rsa_pss_rsae_sha384",
    "rsa_pkcs1_sha384",
    "rsa_pss_rsae_sha512",
    "rsa_pkcs1_sha512",
];

/// Chrome supported curves.
pub const CHROME_CURVES: &[&str] = &["X25519", "P-256", "P-384"];

/// Safari (iOS) cipher suites in exact order.
pub const SAFARI_CIPHER_SUITES: &[&str] = &[
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA",
    "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA",
    "TLS_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_RSA_WITH_AES_256_CBC_SHA",
    "TLS_RSA_WITH_AES_128_CBC_SHA",
];

/// Safari supported curves.
pub const SAFARI_CURVES: &[&str] = &["X25519", "P-256", "P-384", "P-521"];

/// TLS fingerprint configuration.
///
/// Empty lists leave the BoringSSL default in place for that field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFingerprint {
    /// Cipher suites in order.
    pub cipher_list: Vec<&'static str>,
    /// Signature algorithms.
    pub sigalgs: Vec<&'static str>,
    /// Supported curves/groups.
    pub curves: Vec<&'static str>,
    /// Enable GREASE values.
    pub grease: bool,
    /// Randomize extension order per connection (Chrome 110+).
    pub permute_extensions: bool,
}

impl Default for TlsFingerprint {
    fn default() -> Self {
        Self {
            cipher_list: vec![],
            sigalgs: vec![],
            curves: vec![],
            grease: false,
            permute_extensions: false,
        }
    }
}

impl TlsFingerprint {
    /// Create a TLS fingerprint for Chrome.
    pub fn chrome() -> Self {
        Self {
            cipher_list: CHROME_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_SIGNATURE_ALGORITHMS.to_vec(),
            curves: CHROME_CURVES.to_vec(),
            grease: true,
            permute_extensions: true,
        }
    }

    /// Create a TLS fingerprint for Safari on iOS.
    pub fn safari() -> Self {
        Self {
            cipher_list: SAFARI_CIPHER_SUITES.to_vec(),
            sigalgs: CHROME_SIGNATURE_ALGORITHMS.to_vec(),
            curves: SAFARI_CURVES.to_vec(),
            grease: true,
            permute_extensions: false,
        }
    }

    /// Write this fingerprint into a BoringSSL connector builder.
    pub(crate) fn apply(&self, builder: &mut SslConnectorBuilder) -> Result<()> {
        if !self.cipher_list.is_empty() {
            builder
                .set_cipher_list(&self.cipher_list.join(":"))
                .map_err(|e| Error::handshake(format!("Failed to set cipher list: {}", e)))?;
        }

        if !self.curves.is_empty() {
            builder
                .set_curves_list(&self.curves.join(":"))
                .map_err(|e| Error::handshake(format!("Failed to set curves: {}", e)))?;
        }

        if !self.sigalgs.is_empty() {
            builder
                .set_sigalgs_list(&self.sigalgs.join(":"))
                .map_err(|e| {
                    Error::handshake(format!("Failed to set signature algorithms: {}", e))
                })?;
        }

        builder.set_grease_enabled(self.grease);
        builder.set_permute_extensions(self.permute_extensions);

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::handshake(format!("Failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::handshake(format!("Failed to set max TLS version: {}", e)))?;

        Ok(())
    }
}
