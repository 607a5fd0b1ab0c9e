//! TLS material: PEM loading, the listener's rustls config, and a
//! self-signed development certificate.

use crate::config::ServerConfig;
use bdr_core::{BdrError, BdrResult};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn read_pem(path: &Path, what: &str) -> BdrResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| BdrError::Config(format!("cannot read {what} {}: {e}", path.display())))
}

/// All certificates in a PEM file.
pub fn load_certs(path: &Path) -> BdrResult<Vec<CertificateDer<'static>>> {
    let pem = read_pem(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BdrError::Config(format!("bad certificate PEM {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(BdrError::Config(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// The first private key in a PEM file.
pub fn load_key(path: &Path) -> BdrResult<PrivateKeyDer<'static>> {
    let pem = read_pem(path, "key")?;
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| BdrError::Config(format!("bad key PEM {}: {e}", path.display())))?
        .ok_or_else(|| BdrError::Config(format!("no private key found in {}", path.display())))
}

/// Trust anchors from a PEM bundle.
pub fn load_roots(path: &Path) -> BdrResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| BdrError::Config(format!("bad trust anchor in {}: {e}", path.display())))?;
    }
    Ok(roots)
}

/// Certificate chain followed by the private key, as one PEM blob.
///
/// Used as the client identity on outbound reply connections.
pub fn identity_pem(config: &ServerConfig) -> BdrResult<Vec<u8>> {
    let mut pem = read_pem(&config.cert_path, "certificate")?;
    if config.key_path != config.cert_path {
        pem.push(b'\n');
        pem.extend(read_pem(&config.key_path, "key")?);
    }
    Ok(pem)
}

/// Build the listener's rustls config.
///
/// Client certificates are verified against the trust anchor bundle when
/// `require_client_cert` is set, and not requested otherwise.
pub fn server_config(config: &ServerConfig) -> BdrResult<rustls::ServerConfig> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| BdrError::Tls(format!("protocol versions: {e}")))?;
    let builder = if config.require_client_cert {
        let roots = load_roots(&config.ca_path)?;
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| BdrError::Tls(format!("client verifier: {e}")))?;
        builder.with_client_cert_verifier(verifier)
    } else {
        builder.with_no_client_auth()
    };

    let mut tls_config = builder
        .with_single_cert(certs, key)
        .map_err(|e| BdrError::Tls(format!("server certificate: {e}")))?;
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(tls_config)
}

/// Generate a self-signed certificate for development use.
///
/// Returns `(cert_path, key_path)` under `~/.bdr-mock/`.
pub fn generate_self_signed_cert() -> BdrResult<(PathBuf, PathBuf)> {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".bdr-mock");
    std::fs::create_dir_all(&dir)?;

    let cert_path = dir.join("dev-cert.pem");
    let key_path = dir.join("dev-key.pem");

    let mut params = rcgen::CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])
    .map_err(|e| BdrError::Tls(e.to_string()))?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "bdr-mock-server dev cert");

    let key_pair = rcgen::KeyPair::generate().map_err(|e| BdrError::Tls(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| BdrError::Tls(e.to_string()))?;

    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    Ok((cert_path, key_path))
}
