pub mod api;
pub mod websocket;

use crate::agent::Advisor;
use crate::cli::Args;
use log::{ info, warn };
use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

pub struct Server {
    addr: String,
    advisor: Arc<Advisor>,
    api_key: Option<String>,
    args: Args,
}

fn open_pem(path: &str, what: &str) -> Result<BufReader<File>, Box<dyn Error + Send + Sync>> {
    let file = File::open(path).map_err(|e| format!("cannot open TLS {} '{}': {}", what, path, e))?;
    Ok(BufReader::new(file))
}

/// Server config shared by the chat socket; the HTTP API loads its own via axum-server.
pub(crate) fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let chain: Vec<CertificateDer<'static>> = certs(&mut open_pem(cert_path, "certificate")?)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("unreadable certificate chain in '{}': {}", cert_path, e))?;
    if chain.is_empty() {
        return Err(format!("no certificates in '{}'", cert_path).into());
    }

    let key = pkcs8_private_keys(&mut open_pem(key_path, "key")?)
        .next()
        .ok_or_else(|| format!("no PKCS8 private key in '{}'", key_path))?
        .map_err(|e| format!("unreadable private key in '{}': {}", key_path, e))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, PrivateKeyDer::Pkcs8(key))?;
    info!("Loaded TLS certificate chain from '{}'", cert_path);
    Ok(Arc::new(config))
}

impl Server {
    pub fn new(addr: String, advisor: Arc<Advisor>, api_key: Option<String>, args: Args) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        if api_key.is_some() {
            info!("Server configured with signed-request authentication.");
        } else {
            warn!("Server configured WITHOUT authentication. Connections are open.");
        }

        Self { addr, advisor, api_key, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            api::start_http_server(http_port, Arc::clone(&self.advisor), self.args.clone()).await?;
        }

        websocket::start_ws_server(
            &self.addr,
            Arc::clone(&self.advisor),
            self.api_key.clone(),
            self.args.clone()
        ).await
    }
}
