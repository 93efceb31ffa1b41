//! Mutual TLS material for the broker connection.
//!
//! TLS is attempted only when the CA certificate, the PKCS#12 keystore and
//! its password are all configured. Anything less, or material that does
//! not load, is handled according to [`OnInvalidTls`]: `degrade` logs a
//! warning and falls back to plaintext, `fail` refuses to start.

use std::fs;

use openssl::pkcs12::Pkcs12;
use openssl::x509::X509;
use thiserror::Error;
use topicgate_config::{OnInvalidTls, TlsCfg};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("tls is partially configured, missing {0}")]
    Incomplete(&'static str),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ca certificate {path}: {details}")]
    Ca { path: String, details: String },

    #[error("keystore {path}: {details}")]
    Keystore { path: String, details: String },
}

/// PEM-encoded material in the shape librdkafka expects.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_pem: String,
    /// Client certificate followed by any chain certificates from the keystore.
    pub certificate_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca_pem_len", &self.ca_pem.len())
            .field("certificate_pem_len", &self.certificate_pem.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum TlsOutcome {
    Enabled(TlsMaterial),
    Plaintext,
}

impl TlsOutcome {
    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsOutcome::Enabled(_))
    }
}

/// Decide how the broker connection is secured.
pub fn configure(cfg: Option<&TlsCfg>) -> Result<TlsOutcome, TlsError> {
    let Some(cfg) = cfg else {
        return Ok(TlsOutcome::Plaintext);
    };

    if present(&cfg.ca_cert_path).is_none()
        && present(&cfg.keystore_path).is_none()
        && present(&cfg.keystore_password).is_none()
    {
        return Ok(TlsOutcome::Plaintext);
    }

    match TlsMaterial::load(cfg) {
        Ok(material) => {
            info!("mutual tls enabled for broker connection");
            Ok(TlsOutcome::Enabled(material))
        }
        Err(e) if cfg.on_invalid == OnInvalidTls::Degrade => {
            warn!(error = %e, "tls material unusable, connecting to brokers in plaintext");
            Ok(TlsOutcome::Plaintext)
        }
        Err(e) => Err(e),
    }
}

impl TlsMaterial {
    pub fn load(cfg: &TlsCfg) -> Result<Self, TlsError> {
        let ca_path =
            present(&cfg.ca_cert_path).ok_or(TlsError::Incomplete("ca_cert_path"))?;
        let keystore_path =
            present(&cfg.keystore_path).ok_or(TlsError::Incomplete("keystore_path"))?;
        let password =
            present(&cfg.keystore_password).ok_or(TlsError::Incomplete("keystore_password"))?;

        let ca_pem = load_ca(ca_path)?;
        let (certificate_pem, key_pem) = load_keystore(keystore_path, password)?;

        Ok(Self {
            ca_pem,
            certificate_pem,
            key_pem,
        })
    }
}

/// Blank values, such as an unset `${VAR}` expanded to "", count as unset.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn read(path: &str) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_string(),
        source,
    })
}

fn load_ca(path: &str) -> Result<String, TlsError> {
    let raw = read(path)?;
    let certs = X509::stack_from_pem(&raw).map_err(|e| TlsError::Ca {
        path: path.to_string(),
        details: e.to_string(),
    })?;
    if certs.is_empty() {
        return Err(TlsError::Ca {
            path: path.to_string(),
            details: "no certificates found".into(),
        });
    }

    let mut pem = String::new();
    for cert in certs {
        pem.push_str(&to_pem_string(path, cert.to_pem(), |path, details| {
            TlsError::Ca { path, details }
        })?);
    }
    Ok(pem)
}

fn load_keystore(path: &str, password: &str) -> Result<(String, String), TlsError> {
    let keystore_err = |details: String| TlsError::Keystore {
        path: path.to_string(),
        details,
    };

    let raw = read(path)?;
    let parsed = Pkcs12::from_der(&raw)
        .and_then(|p12| p12.parse2(password))
        .map_err(|e| keystore_err(e.to_string()))?;

    let cert = parsed
        .cert
        .ok_or_else(|| keystore_err("no client certificate".into()))?;
    let pkey = parsed
        .pkey
        .ok_or_else(|| keystore_err("no private key".into()))?;

    let to_keystore_err =
        |path: String, details: String| TlsError::Keystore { path, details };

    let mut certificate_pem = to_pem_string(path, cert.to_pem(), to_keystore_err)?;
    if let Some(chain) = parsed.ca {
        for c in chain.iter() {
            certificate_pem.push_str(&to_pem_string(path, c.to_pem(), to_keystore_err)?);
        }
    }
    let key_pem =
        to_pem_string(path, pkey.private_key_to_pem_pkcs8(), to_keystore_err)?;

    Ok((certificate_pem, key_pem))
}

fn to_pem_string(
    path: &str,
    pem: Result<Vec<u8>, openssl::error::ErrorStack>,
    err: impl Fn(String, String) -> TlsError,
) -> Result<String, TlsError> {
    let bytes = pem.map_err(|e| err(path.to_string(), e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| err(path.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::{PKey, Private};
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;
    use std::path::Path;
    use tempfile::TempDir;

    fn self_signed(cn: &str) -> (X509, PKey<Private>) {
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        (builder.build(), pkey)
    }

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let (ca, _) = self_signed("test-ca");
            let (client, key) = self_signed("client");
            let p12 = Pkcs12::builder()
                .name("client")
                .pkey(&key)
                .cert(&client)
                .build2("changeit")
                .unwrap();

            fs::write(dir.path().join("ca.pem"), ca.to_pem().unwrap()).unwrap();
            fs::write(dir.path().join("client.p12"), p12.to_der().unwrap())
                .unwrap();
            fs::write(dir.path().join("garbage.pem"), b"not a certificate")
                .unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> String {
            Path::new(self.dir.path())
                .join(name)
                .to_string_lossy()
                .into_owned()
        }

        fn cfg(&self, on_invalid: OnInvalidTls) -> TlsCfg {
            TlsCfg {
                ca_cert_path: Some(self.path("ca.pem")),
                keystore_path: Some(self.path("client.p12")),
                keystore_password: Some("changeit".into()),
                on_invalid,
            }
        }
    }

    #[test]
    fn no_tls_section_is_plaintext() {
        assert!(!configure(None).unwrap().is_enabled());
        assert!(!configure(Some(&TlsCfg::default())).unwrap().is_enabled());
    }

    #[test]
    fn loads_complete_material() {
        let fx = Fixture::new();
        match configure(Some(&fx.cfg(OnInvalidTls::Fail))).unwrap() {
            TlsOutcome::Enabled(m) => {
                assert!(m.ca_pem.starts_with("-----BEGIN CERTIFICATE-----"));
                assert!(m.certificate_pem.contains("BEGIN CERTIFICATE"));
                assert!(m.key_pem.contains("BEGIN PRIVATE KEY"));
            }
            TlsOutcome::Plaintext => panic!("expected tls"),
        }
    }

    #[test]
    fn blank_fields_count_as_unset() {
        let blank = TlsCfg {
            ca_cert_path: Some(String::new()),
            keystore_path: Some("  ".into()),
            keystore_password: Some(String::new()),
            on_invalid: OnInvalidTls::Fail,
        };
        assert!(!configure(Some(&blank)).unwrap().is_enabled());

        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Fail);
        cfg.keystore_password = Some(String::new());
        assert!(matches!(
            configure(Some(&cfg)).unwrap_err(),
            TlsError::Incomplete("keystore_password")
        ));
    }

    #[test]
    fn partial_config_degrades_by_default() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Degrade);
        cfg.keystore_password = None;
        assert!(!configure(Some(&cfg)).unwrap().is_enabled());
    }

    #[test]
    fn partial_config_fails_when_strict() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Fail);
        cfg.keystore_path = None;
        let err = configure(Some(&cfg)).unwrap_err();
        assert!(matches!(err, TlsError::Incomplete("keystore_path")));
    }

    #[test]
    fn wrong_password_is_keystore_error() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Fail);
        cfg.keystore_password = Some("wrong".into());
        assert!(matches!(
            configure(Some(&cfg)).unwrap_err(),
            TlsError::Keystore { .. }
        ));

        cfg.on_invalid = OnInvalidTls::Degrade;
        assert!(!configure(Some(&cfg)).unwrap().is_enabled());
    }

    #[test]
    fn ca_without_certificates_is_rejected() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Fail);
        cfg.ca_cert_path = Some(fx.path("garbage.pem"));
        assert!(matches!(
            configure(Some(&cfg)).unwrap_err(),
            TlsError::Ca { .. }
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg(OnInvalidTls::Fail);
        cfg.ca_cert_path = Some(fx.path("nope.pem"));
        assert!(matches!(
            configure(Some(&cfg)).unwrap_err(),
            TlsError::Io { .. }
        ));
    }
}
