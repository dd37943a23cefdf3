//! Shared fixtures for integration tests: a throwaway PKI, an echo backend,
//! a running proxy and a TLS client.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use tls_proxy::net::connection::ConnectionTracker;
use tls_proxy::{Identity, Relay, RelayConfig, TlsListener};

/// CA plus issued leaf certificates, written to a temporary directory.
pub struct Pki {
    dir: tempfile::TempDir,
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl Pki {
    pub fn new() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "tls-proxy test CA");

        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = params.self_signed(&ca_key).unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca.pem"), ca_cert.pem()).unwrap();

        Self {
            dir,
            ca_cert,
            ca_key,
        }
    }

    pub fn ca_file(&self) -> PathBuf {
        self.dir.path().join("ca.pem")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Issue a CA-signed certificate for `name` and return (cert, key) paths.
    pub fn issue(&self, name: &str, usage: ExtendedKeyUsagePurpose) -> (PathBuf, PathBuf) {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages.push(usage);

        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let cert_path = self.path(&format!("{name}.pem"));
        let key_path = self.path(&format!("{name}-key.pem"));
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key.serialize_pem()).unwrap();
        (cert_path, key_path)
    }

    /// Server identity for `localhost`, optionally requiring client certificates.
    pub fn server_identity(&self, require_client_cert: bool) -> Identity {
        let (cert, key) = self.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth);
        let ca = require_client_cert.then(|| self.ca_file());
        Identity::new(Some(cert), Some(key), ca)
    }

    /// Client identity trusting this CA, with or without its own certificate.
    pub fn client_identity(&self, with_cert: bool) -> Identity {
        if with_cert {
            let (cert, key) = self.issue("client", ExtendedKeyUsagePurpose::ClientAuth);
            Identity::new(Some(cert), Some(key), Some(self.ca_file()))
        } else {
            Identity::new(None, None, Some(self.ca_file()))
        }
    }
}

/// TCP backend that echoes everything and records what it received.
pub struct EchoBackend {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<u8>>>,
}

impl EchoBackend {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                sink.lock().unwrap().extend_from_slice(&buf[..n]);
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self { addr, received }
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }
}

/// Address with nothing listening on it.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub tracker: ConnectionTracker,
}

/// Start a proxy on an ephemeral port relaying to `backend`.
pub async fn start_proxy(server: &Identity, backend: SocketAddr, deadline: Duration) -> RunningProxy {
    let tls = server.server_config().unwrap();
    let listener = TlsListener::bind("127.0.0.1:0", &tls).await.unwrap();
    let relay = Relay::new(listener, RelayConfig::new(backend).with_deadline(deadline));

    let proxy = RunningProxy {
        addr: relay.local_addr().unwrap(),
        tracker: relay.tracker(),
    };
    tokio::spawn(relay.run());
    proxy
}

/// TLS-connect to the proxy as `localhost` using `client`'s config.
pub async fn connect(client: &Identity, proxy: SocketAddr) -> std::io::Result<TlsStream<TcpStream>> {
    let config = client.client_config().unwrap().to_rustls().unwrap();
    let connector = TlsConnector::from(config);
    let stream = TcpStream::connect(proxy).await?;
    connector
        .connect(ServerName::try_from("localhost").unwrap(), stream)
        .await
}

/// True once the peer has closed: end of stream or a reset.
pub async fn wait_for_close<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return true,
            Ok(_) => continue,
        }
    }
}
