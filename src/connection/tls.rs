// (c) 2025 peerlink developers

//! TLS 1.3 configuration for the two stream sockets
//!
//! Both peers are symmetric, so one [`TlsMaterial`] carries a connector and
//! an acceptor built from the same self-signed credentials. TLS 1.3 only;
//! no client authentication; server certificates are accepted without
//! chain validation (the certificates are self-signed by design), though
//! the handshake signature itself is still verified.

use std::sync::Arc;

use anyhow::Result;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::{DigitallySignedStruct, Error as TlsError, PeerIncompatible, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::util::Credentials;

/// Ready-to-use TLS plumbing for one connection. Clones share the
/// underlying rustls configs.
#[derive(Clone)]
pub(crate) struct TlsMaterial {
    pub(crate) connector: TlsConnector,
    pub(crate) acceptor: TlsAcceptor,
}

/// Builds client and server configs from the given credentials.
pub(crate) fn build_material(credentials: &Credentials) -> Result<TlsMaterial> {
    let provider = Arc::new(ring::default_provider());

    let server_config = rustls::ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(credentials.cert_chain.clone(), credentials.key.clone_key())?;

    let verifier = Arc::new(TrustingServerCertVerifier {
        supported_algs: provider.signature_verification_algorithms,
    });
    let client_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(TlsMaterial {
        connector: TlsConnector::from(Arc::new(client_config)),
        acceptor: TlsAcceptor::from(Arc::new(server_config)),
    })
}

/// Accepts any server certificate. The peers use self-signed certificates
/// with no shared PKI; the trust boundary is the private network, not the
/// certificate chain. Handshake signatures are still checked, and TLS 1.2
/// is refused outright.
#[derive(Debug)]
struct TrustingServerCertVerifier {
    supported_algs: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for TrustingServerCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Err(TlsError::PeerIncompatible(
            PeerIncompatible::Tls12NotOffered,
        ))
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}
