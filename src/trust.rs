//! # Trust Material
//!
//! Certificates the application trusts ([`TrustStore`]) and the certificate chain it
//! presents to servers requiring mutual TLS ([`ClientIdentity`]). Both are loaded once
//! at startup from the paths in the decoded configuration and handed to resource
//! parameters through the Configure phase data.
//!
//! Files are read as PEM. A trust file holding no PEM block at all is taken to be a
//! single DER certificate.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
}

fn read_file(path: &Path) -> Result<Vec<u8>, TrustError> {
    let io = |source| TrustError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut data = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut data))
        .map_err(io)?;
    Ok(data)
}

fn pem_certificates(path: &Path, data: &[u8]) -> Result<Vec<CertificateDer<'static>>, TrustError> {
    let mut reader = BufReader::new(data);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TrustError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// The set of trusted root certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    certificates: Vec<CertificateDer<'static>>,
}

impl TrustStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every certificate from `paths`, in order.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, TrustError> {
        let mut certificates = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let data = read_file(path)?;
            let mut found = pem_certificates(path, &data)?;
            if found.is_empty() {
                if data.is_empty() {
                    return Err(TrustError::NoCertificates(path.to_path_buf()));
                }
                found.push(CertificateDer::from(data));
            }
            debug!(path = %path.display(), count = found.len(), "Loaded trusted certificates");
            certificates.extend(found);
        }
        Ok(Self { certificates })
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// A client certificate chain with its private key.
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    pub fn load(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Result<Self, TrustError> {
        let (cert, key) = (cert.as_ref(), key.as_ref());

        let chain = pem_certificates(cert, &read_file(cert)?)?;
        if chain.is_empty() {
            return Err(TrustError::NoCertificates(cert.to_path_buf()));
        }

        let data = read_file(key)?;
        let private_key = rustls_pemfile::private_key(&mut BufReader::new(&data[..]))
            .map_err(|source| TrustError::Io {
                path: key.to_path_buf(),
                source,
            })?
            .ok_or_else(|| TrustError::NoPrivateKey(key.to_path_buf()))?;

        debug!(cert = %cert.display(), chain = chain.len(), "Loaded client identity");
        Ok(Self {
            chain,
            key: private_key,
        })
    }

    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain", &self.chain.len())
            .finish_non_exhaustive()
    }
}
