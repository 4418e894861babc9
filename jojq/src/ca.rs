use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::error::ProxyError;
use crate::leaf_cache::LeafCache;

const CA_CERT_FILE: &str = "ca-cert.pem";
const CA_KEY_FILE: &str = "ca-key.pem";

/// One leaf certificate plus its private key, ready to be handed to a
/// `rustls::ServerConfig`.
#[derive(Clone)]
pub struct Leaf {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Loads or generates the long-lived root CA, and mints per-host leaf
/// certificates on demand, caching them in memory.
pub struct CaManager {
    dir: PathBuf,
    ca_cert: Certificate,
    ca_key: KeyPair,
    ca_der: CertificateDer<'static>,
    leaves: LeafCache,
}

impl CaManager {
    /// Loads the CA from `dir` if `ca-cert.pem`/`ca-key.pem` exist, else
    /// generates a fresh root and persists it there.
    pub fn load_or_generate(dir: &Path, max_leaf_cache: usize) -> Result<Self, ProxyError> {
        let cert_path = dir.join(CA_CERT_FILE);
        let key_path = dir.join(CA_KEY_FILE);

        let (ca_cert, ca_key) = if cert_path.exists() && key_path.exists() {
            info!(dir = %dir.display(), "loading existing CA");
            let cert_pem = fs::read_to_string(&cert_path).map_err(ProxyError::CaDirUnwritable)?;
            let key_pem = fs::read_to_string(&key_path).map_err(ProxyError::CaDirUnwritable)?;

            let ca_key = KeyPair::from_pem(&key_pem)
                .map_err(|e| ProxyError::CaGenerate(format!("parsing CA key: {e}")))?;
            let params = CertificateParams::from_ca_cert_pem(&cert_pem)
                .map_err(|e| ProxyError::CaGenerate(format!("parsing CA cert: {e}")))?;
            let ca_cert = params
                .self_signed(&ca_key)
                .map_err(|e| ProxyError::CaGenerate(format!("rebuilding CA cert: {e}")))?;

            (ca_cert, ca_key)
        } else {
            info!(dir = %dir.display(), "generating new CA");
            fs::create_dir_all(dir).map_err(ProxyError::CaDirUnwritable)?;
            let (ca_cert, ca_key) = generate_root()?;
            fs::write(&cert_path, ca_cert.pem()).map_err(ProxyError::CaDirUnwritable)?;
            fs::write(&key_path, ca_key.serialize_pem()).map_err(ProxyError::CaDirUnwritable)?;
            (ca_cert, ca_key)
        };

        let ca_der = ca_cert.der().clone();

        Ok(CaManager {
            dir: dir.to_path_buf(),
            ca_cert,
            ca_key,
            ca_der,
            leaves: LeafCache::new(max_leaf_cache),
        })
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    /// Returns the cached leaf for `hostname`, minting one if absent. The
    /// hostname is lowercased before lookup so `Example.com` and
    /// `example.com` share a single leaf.
    pub fn leaf_for(&self, hostname: &str) -> Result<Arc<Leaf>, ProxyError> {
        let key = hostname.to_ascii_lowercase();
        if let Some(leaf) = self.leaves.get(&key) {
            return Ok(leaf);
        }

        let leaf = Arc::new(self.mint_leaf(&key)?);
        self.leaves.insert(key, leaf.clone());
        Ok(leaf)
    }

    fn mint_leaf(&self, hostname: &str) -> Result<Leaf, ProxyError> {
        let mut params = CertificateParams::default();

        params.subject_alt_names = vec![SanType::DnsName(
            Ia5String::try_from(hostname).map_err(|_| ProxyError::LeafMint {
                host: hostname.to_string(),
                source: "hostname is not a valid IA5 string".into(),
            })?,
        )];

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, hostname);
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let now = OffsetDateTime::now_utc();
        params.not_before = now.checked_sub(Duration::hours(1)).unwrap_or(now);
        params.not_after = now.checked_add(Duration::days(365)).unwrap_or(now);
        params.serial_number = Some(millis_serial(now));

        let key_pair = KeyPair::generate().map_err(|e| ProxyError::LeafMint {
            host: hostname.to_string(),
            source: format!("key generation failed: {e}"),
        })?;
        let cert = params
            .signed_by(&key_pair, &self.ca_cert, &self.ca_key)
            .map_err(|e| ProxyError::LeafMint {
                host: hostname.to_string(),
                source: format!("signing failed: {e}"),
            })?;

        let chain = vec![cert.der().clone(), self.ca_der.clone()];
        let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        Ok(Leaf { chain, key })
    }
}

fn generate_root() -> Result<(Certificate, KeyPair), ProxyError> {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "jojq Root CA");
    dn.push(DnType::OrganizationName, "jojq");

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let now = OffsetDateTime::now_utc();
    params.not_before = now.checked_sub(Duration::hours(1)).unwrap_or(now);
    params.not_after = now.checked_add(Duration::days(3650)).unwrap_or(now);

    let key_pair =
        KeyPair::generate().map_err(|e| ProxyError::CaGenerate(format!("key generation: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| ProxyError::CaGenerate(format!("self-signing: {e}")))?;
    Ok((cert, key_pair))
}

fn millis_serial(now: OffsetDateTime) -> rcgen::SerialNumber {
    let millis = (now.unix_timestamp_nanos() / 1_000_000) as u64;
    rcgen::SerialNumber::from(millis.to_be_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::pki_types::CertificateDer as RustlsCertDer;
    use x509_parser::prelude::FromDer;

    fn temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("jojq-ca-test-{name}-{}", std::process::id()));
        dir
    }

    #[test]
    fn generates_then_reuses_ca_from_disk() {
        let dir = temp_dir("reuse");
        let _ = fs::remove_dir_all(&dir);

        let first = CaManager::load_or_generate(&dir, 10).unwrap();
        let first_pem = fs::read_to_string(first.ca_cert_path()).unwrap();

        let second = CaManager::load_or_generate(&dir, 10).unwrap();
        let second_pem = fs::read_to_string(second.ca_cert_path()).unwrap();

        assert_eq!(first_pem, second_pem);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn distinct_hosts_get_distinct_leaves() {
        let dir = temp_dir("distinct");
        let _ = fs::remove_dir_all(&dir);
        let manager = CaManager::load_or_generate(&dir, 10).unwrap();

        let a = manager.leaf_for("a.example.com").unwrap();
        let b = manager.leaf_for("b.example.com").unwrap();
        assert_ne!(a.chain[0].as_ref(), b.chain[0].as_ref());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn same_host_reuses_cached_leaf() {
        let dir = temp_dir("cached");
        let _ = fs::remove_dir_all(&dir);
        let manager = CaManager::load_or_generate(&dir, 10).unwrap();

        let a = manager.leaf_for("example.com").unwrap();
        let b = manager.leaf_for("Example.com").unwrap();
        assert_eq!(a.chain[0].as_ref(), b.chain[0].as_ref());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn leaf_verifies_against_ca() {
        let dir = temp_dir("verify");
        let _ = fs::remove_dir_all(&dir);
        let manager = CaManager::load_or_generate(&dir, 10).unwrap();
        let leaf = manager.leaf_for("verify.example.com").unwrap();

        let (_, leaf_cert) = x509_parser::certificate::X509Certificate::from_der(
            leaf.chain[0].as_ref(),
        )
        .unwrap();
        let ca_der: RustlsCertDer = manager.ca_der.clone();
        let (_, ca_cert) =
            x509_parser::certificate::X509Certificate::from_der(ca_der.as_ref()).unwrap();

        assert_eq!(leaf_cert.issuer(), ca_cert.subject());
        fs::remove_dir_all(&dir).ok();
    }
}
