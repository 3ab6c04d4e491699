use anyhow::Result;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::{env, fs, path::Path};

const DEV_CERT_PATH: &str = "certs/dev-cert.pem";
const DEV_KEY_PATH: &str = "certs/dev-key.pem";

/// Deployed behind the platform's cert distribution (`TLS_CERT_PATH` /
/// `TLS_KEY_PATH`); falls back to a generated self-signed pair for dev.
pub fn rustls_config() -> Result<ServerConfig> {
    let cert_path = env::var("TLS_CERT_PATH").unwrap_or_else(|_| DEV_CERT_PATH.into());
    let key_path = env::var("TLS_KEY_PATH").unwrap_or_else(|_| DEV_KEY_PATH.into());

    if !Path::new(&cert_path).exists() || !Path::new(&key_path).exists() {
        if let Some(dir) = Path::new(&cert_path).parent() {
            fs::create_dir_all(dir)?;
        }
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".into(), "127.0.0.1".into()])?;
        fs::write(&cert_path, cert.pem())?;
        fs::write(&key_path, key_pair.serialize_pem())?;
    }

    let cert_pem = fs::read(&cert_path)?;
    let key_pem = fs::read(&key_path)?;

    let chain: Vec<_> = certs(&mut &*cert_pem).collect::<Result<_, _>>()?;
    let mut keys: Vec<_> = pkcs8_private_keys(&mut &*key_pem).collect::<Result<_, _>>()?;
    let key = keys.pop().ok_or_else(|| anyhow::anyhow!("private key missing"))?;

    let cfg = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            chain.into_iter().map(CertificateDer::from).collect(),
            PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key)),
        )?;

    Ok(cfg)
}
