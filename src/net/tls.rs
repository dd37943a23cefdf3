//! TLS identity loading and configuration.
//!
//! # Responsibilities
//! - Load a PEM certificate chain and private key from disk
//! - Build a trust pool from a PEM CA bundle
//! - Derive server-side (listener) and client-side (dialer) rustls configs
//!   from the same certificate/key/CA triple
//!
//! # Design Decisions
//! - Nothing is cached: every derivation re-reads the files, so picking up new
//!   certificates means building a new config
//! - A CA file on the server side always means "require and verify client certs"
//! - Key pair parsing goes through a replaceable [`KeyPairParser`]

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{ProtocolVersion, RootCertStore};

/// Oldest protocol version either side will negotiate. Newer versions are
/// preferred when both peers support them.
pub const MIN_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::TLSv1_2;

/// Errors produced while building TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Only one half of the certificate/key pair was configured.
    #[error("cert file and key file must both be present [cert: {cert:?}, key: {key:?}]")]
    MissingKeyPair { cert: String, key: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// Client verification was requested but the CA bundle holds no certificates.
    #[error("CA file {} contains no certificates", path.display())]
    NoClientRoots { path: PathBuf },

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

impl TlsError {
    fn parse(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        TlsError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// A certificate chain (leaf first) together with its private key.
pub struct CertifiedKeyPair {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl CertifiedKeyPair {
    pub fn new(cert_chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { cert_chain, key }
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

impl Clone for CertifiedKeyPair {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for CertifiedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKeyPair")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// Turns raw certificate and key file contents into a key pair.
///
/// [`parse_pem_key_pair`] is used unless an [`Identity`] is given another
/// parser through [`Identity::with_parser`].
pub type KeyPairParser = fn(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertifiedKeyPair, TlsError>;

/// Default [`KeyPairParser`]: PEM certificate chain plus a PKCS#8, PKCS#1 or
/// SEC1 private key that the crypto provider can load.
pub fn parse_pem_key_pair(cert_pem: &[u8], key_pem: &[u8]) -> Result<CertifiedKeyPair, TlsError> {
    let cert_chain = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::parse("certificate", e))?;
    if cert_chain.is_empty() {
        return Err(TlsError::parse("certificate", "no PEM certificate block found"));
    }

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| TlsError::parse("private key", e))?
        .ok_or_else(|| TlsError::parse("private key", "no PEM private key block found"))?;

    // Checks the leaf is well-formed X.509 and that the key matches it.
    CertifiedKey::from_der(cert_chain.clone(), key.clone_key(), &crypto_provider())
        .map_err(|e| TlsError::parse("certificate/key pair", e))?;

    Ok(CertifiedKeyPair::new(cert_chain, key))
}

/// Set of trusted certificates decoded from a PEM bundle.
#[derive(Debug, Clone)]
pub struct TrustPool {
    roots: RootCertStore,
}

impl TrustPool {
    /// Read and decode a CA bundle file.
    pub fn from_pem_file(path: &Path) -> Result<Self, TlsError> {
        let bundle = read_file(path)?;
        Self::from_pem(&bundle).map_err(|e| match e {
            TlsError::Parse { reason, .. } => {
                TlsError::parse(format!("CA file {}", path.display()), reason)
            }
            other => other,
        })
    }

    /// Decode every PEM block in `bundle` as an X.509 certificate.
    ///
    /// The first malformed or non-certificate block fails the whole pool.
    /// Input without any PEM block yields an empty pool.
    pub fn from_pem(bundle: &[u8]) -> Result<Self, TlsError> {
        let blocks = pem::parse_many(bundle).map_err(|e| TlsError::parse("CA certificate", e))?;
        let mut roots = RootCertStore::empty();

        for block in blocks {
            if block.tag() != "CERTIFICATE" {
                return Err(TlsError::parse(
                    "CA certificate",
                    format!("unexpected PEM block {:?}", block.tag()),
                ));
            }
            roots
                .add(CertificateDer::from(block.into_contents()))
                .map_err(|e| TlsError::parse("CA certificate", e))?;
        }

        Ok(Self { roots })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn root_store(&self) -> &RootCertStore {
        &self.roots
    }
}

/// How the server treats client certificates.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    /// No client certificate is requested.
    NoClientCert,
    /// Clients must present a certificate chaining to this pool.
    RequireAndVerify(TrustPool),
}

impl ClientAuth {
    pub fn requires_client_cert(&self) -> bool {
        matches!(self, ClientAuth::RequireAndVerify(_))
    }
}

/// Server-side TLS configuration derived from an [`Identity`].
#[derive(Debug, Clone)]
pub struct ServerTlsConfig {
    key_pair: CertifiedKeyPair,
    client_auth: ClientAuth,
}

impl ServerTlsConfig {
    pub fn key_pair(&self) -> &CertifiedKeyPair {
        &self.key_pair
    }

    pub fn client_auth(&self) -> &ClientAuth {
        &self.client_auth
    }

    pub fn min_version(&self) -> ProtocolVersion {
        MIN_PROTOCOL_VERSION
    }

    /// Build the rustls config handed to the acceptor.
    pub fn to_rustls(&self) -> Result<Arc<rustls::ServerConfig>, TlsError> {
        let provider = crypto_provider();
        let builder = rustls::ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(rustls::ALL_VERSIONS)?;

        let builder = match &self.client_auth {
            ClientAuth::NoClientCert => builder.with_no_client_auth(),
            ClientAuth::RequireAndVerify(pool) => {
                let verifier = WebPkiClientVerifier::builder_with_provider(
                    Arc::new(pool.roots.clone()),
                    provider,
                )
                .build()
                .map_err(|e| match e {
                    VerifierBuilderError::NoRootAnchors => {
                        TlsError::parse("client CA pool", "no trust anchors")
                    }
                    other => TlsError::parse("client CA pool", other),
                })?;
                builder.with_client_cert_verifier(verifier)
            }
        };

        let config = builder.with_single_cert(
            self.key_pair.cert_chain.clone(),
            self.key_pair.key.clone_key(),
        )?;
        Ok(Arc::new(config))
    }
}

/// Client-side TLS configuration derived from an [`Identity`].
#[derive(Debug, Clone)]
pub struct ClientTlsConfig {
    key_pair: Option<CertifiedKeyPair>,
    roots: Option<TrustPool>,
}

impl ClientTlsConfig {
    /// Certificate presented to servers, absent for an anonymous client.
    pub fn key_pair(&self) -> Option<&CertifiedKeyPair> {
        self.key_pair.as_ref()
    }

    /// Trusted roots from the CA file, absent when none was configured.
    pub fn roots(&self) -> Option<&TrustPool> {
        self.roots.as_ref()
    }

    /// Build the rustls config for a connector. Without a CA file the
    /// Mozilla root set is trusted.
    pub fn to_rustls(&self) -> Result<Arc<rustls::ClientConfig>, TlsError> {
        let roots = match &self.roots {
            Some(pool) => pool.roots.clone(),
            None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
        };

        let builder = rustls::ClientConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(rustls::ALL_VERSIONS)?
            .with_root_certificates(roots);

        let config = match &self.key_pair {
            Some(pair) => {
                builder.with_client_auth_cert(pair.cert_chain.clone(), pair.key.clone_key())?
            }
            None => builder.with_no_client_auth(),
        };
        Ok(Arc::new(config))
    }
}

/// Certificate, key and CA file locations.
///
/// Certificate and key form a pair: both set or both unset. Empty paths
/// count as unset.
#[derive(Clone)]
pub struct Identity {
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    ca_file: Option<PathBuf>,
    parser: KeyPairParser,
}

impl Identity {
    pub fn new(
        cert_file: Option<PathBuf>,
        key_file: Option<PathBuf>,
        ca_file: Option<PathBuf>,
    ) -> Self {
        Self {
            cert_file: non_empty(cert_file),
            key_file: non_empty(key_file),
            ca_file: non_empty(ca_file),
            parser: parse_pem_key_pair,
        }
    }

    /// Replace the key pair parser.
    pub fn with_parser(mut self, parser: KeyPairParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn ca_file(&self) -> Option<&Path> {
        self.ca_file.as_deref()
    }

    /// True when neither certificate nor key is configured. The CA file does
    /// not count.
    pub fn is_empty(&self) -> bool {
        self.cert_file.is_none() && self.key_file.is_none()
    }

    /// Read and parse the certificate/key pair.
    pub fn load_key_pair(&self) -> Result<CertifiedKeyPair, TlsError> {
        let (cert_file, key_file) = match (&self.cert_file, &self.key_file) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                return Err(TlsError::MissingKeyPair {
                    cert: display_path(&self.cert_file),
                    key: display_path(&self.key_file),
                })
            }
        };

        let cert_pem = read_file(cert_file)?;
        let key_pem = read_file(key_file)?;
        (self.parser)(&cert_pem, &key_pem)
    }

    /// Configuration for accepting TLS connections. The key pair is mandatory.
    ///
    /// A CA file holding no certificates is refused here instead of producing
    /// a listener that rejects every client.
    pub fn server_config(&self) -> Result<ServerTlsConfig, TlsError> {
        let key_pair = self.load_key_pair()?;

        let client_auth = match &self.ca_file {
            Some(ca_file) => {
                let pool = TrustPool::from_pem_file(ca_file)?;
                if pool.is_empty() {
                    return Err(TlsError::NoClientRoots {
                        path: ca_file.clone(),
                    });
                }
                ClientAuth::RequireAndVerify(pool)
            }
            None => ClientAuth::NoClientCert,
        };

        tracing::debug!(identity = %self, mutual_tls = client_auth.requires_client_cert(), "Server TLS config built");

        Ok(ServerTlsConfig {
            key_pair,
            client_auth,
        })
    }

    /// Configuration for dialing TLS servers. An empty identity yields an
    /// anonymous client; the CA file is honoured either way.
    pub fn client_config(&self) -> Result<ClientTlsConfig, TlsError> {
        let key_pair = if self.is_empty() {
            None
        } else {
            Some(self.load_key_pair()?)
        };

        let roots = self
            .ca_file
            .as_deref()
            .map(TrustPool::from_pem_file)
            .transpose()?;

        Ok(ClientTlsConfig { key_pair, roots })
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cert = {}, key = {}, ca = {}",
            display_path(&self.cert_file),
            display_path(&self.key_file),
            display_path(&self.ca_file)
        )
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("ca_file", &self.ca_file)
            .finish_non_exhaustive()
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}
