// (c) 2025 peerlink developers

//! X509 certificate management helper
//!
//! TLS mode uses a self-signed EC P-256 certificate with CN `localhost` and
//! a 30-day validity, stored as `privateKey.key` and `certificate.crt` in a
//! caller-supplied directory. Peer verification is disabled (the trust
//! boundary is elsewhere), so the certificate only needs to exist and parse.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration as StdDuration, SystemTime};

use anyhow::{Context as _, Result};
use rcgen::{CertificateParams, DnType, KeyPair};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

const KEY_FILE: &str = "privateKey.key";
const CERT_FILE: &str = "certificate.crt";
const VALIDITY_DAYS: i64 = 30;

/// In-memory TLS credentials, ready for a rustls config.
pub struct Credentials {
    /// Certificate chain (a single self-signed certificate).
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Matching private key.
    pub key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cert_chain", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Loads the keypair from `dir`, generating a fresh one first if the
    /// files are missing or close to expiry.
    ///
    /// # Errors
    /// Filesystem failures, or key/certificate material that does not parse.
    pub fn load_or_generate(dir: &Path) -> Result<Self> {
        if !material_is_current(dir) {
            generate(dir)?;
        }
        load(dir)
    }
}

/// A certificate is considered usable while younger than its validity minus
/// a safety margin. Parsing X509 validity back out would need another
/// dependency; file age is an adequate proxy since we are the only writer.
fn material_is_current(dir: &Path) -> bool {
    let key = dir.join(KEY_FILE);
    let cert = dir.join(CERT_FILE);
    if !key.is_file() || !cert.is_file() {
        return false;
    }
    let Ok(modified) = fs::metadata(&cert).and_then(|m| m.modified()) else {
        return false;
    };
    let margin = StdDuration::from_secs(60 * 60 * 24);
    let usable_for = StdDuration::from_secs(60 * 60 * 24 * VALIDITY_DAYS as u64) - margin;
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < usable_for,
        Err(_) => false, // mtime in the future; regenerate
    }
}

fn generate(dir: &Path) -> Result<()> {
    info!("generating self-signed certificate in {}", dir.display());
    fs::create_dir_all(dir)
        .with_context(|| format!("creating certificate directory {}", dir.display()))?;

    // rcgen's default keypair algorithm is ECDSA P-256 with SHA-256.
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
    params
        .distinguished_name
        .push(DnType::CommonName, "localhost");
    params
        .distinguished_name
        .push(DnType::OrganizationName, "peerlink");
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(VALIDITY_DAYS);
    let cert = params.self_signed(&key_pair)?;

    fs::write(dir.join(KEY_FILE), key_pair.serialize_pem()).context("writing private key")?;
    fs::write(dir.join(CERT_FILE), cert.pem()).context("writing certificate")?;
    Ok(())
}

fn load(dir: &Path) -> Result<Credentials> {
    let cert_path = dir.join(CERT_FILE);
    let key_path = dir.join(KEY_FILE);
    debug!("loading certificate from {}", cert_path.display());

    let mut reader = BufReader::new(
        fs::File::open(&cert_path)
            .with_context(|| format!("opening {}", cert_path.display()))?,
    );
    let cert_chain = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .context("parsing certificate chain")?;
    anyhow::ensure!(!cert_chain.is_empty(), "no certificates found in {}", cert_path.display());

    let mut reader = BufReader::new(
        fs::File::open(&key_path).with_context(|| format!("opening {}", key_path.display()))?,
    );
    let key = rustls_pemfile::private_key(&mut reader)
        .context("parsing private key")?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    Ok(Credentials { cert_chain, key })
}
