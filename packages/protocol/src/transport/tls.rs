//! Modbus/TLS server: the same MBAP framing as plain TCP, wrapped in a
//! `rustls` session. Optionally requires a client certificate signed by a
//! configured CA, for mutual TLS (spec.md §6).

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use rmodbus::ModbusProto;
use rustls_pemfile::{certs, private_key};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{RootCertStore, ServerConfig};
use tokio_rustls::TlsAcceptor;

use crate::memory_map::SlaveTable;
use crate::transport::framing::read_mbap_frame;
use crate::transport::responder::respond;

/// Server identity plus the optional client-CA bundle that turns this into
/// mutual TLS. Built once at startup and shared across every accepted
/// connection.
pub struct TlsIdentity {
    pub cert_path: String,
    pub key_path: String,
    pub client_ca_path: Option<String>,
}

fn load_certs(path: &str) -> Result<Vec<tokio_rustls::rustls::pki_types::CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("opening TLS certificate {path}"))?;
    certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("parsing TLS certificate {path}"))
}

fn load_key(path: &str) -> Result<tokio_rustls::rustls::pki_types::PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("opening TLS private key {path}"))?;
    private_key(&mut BufReader::new(file))
        .with_context(|| format!("parsing TLS private key {path}"))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {path}"))
}

fn build_server_config(identity: &TlsIdentity) -> Result<ServerConfig> {
    let certs = load_certs(&identity.cert_path)?;
    let key = load_key(&identity.key_path)?;

    let config = match &identity.client_ca_path {
        Some(ca_path) => {
            let mut roots = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .with_context(|| format!("adding client CA from {ca_path}"))?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .context("building mutual-TLS client verifier")?;
            ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
                .context("building mutual-TLS server config")?
        }
        None => ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("building TLS server config")?,
    };
    Ok(config)
}

/// Serve Modbus/TLS on `address` until the process is asked to stop.
pub async fn serve(address: &str, slaves: Arc<SlaveTable>, identity: &TlsIdentity) -> Result<()> {
    let config = build_server_config(identity)?;
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("binding Modbus/TLS listener on {address}"))?;
    let mutual = identity.client_ca_path.is_some();
    log::info!("Modbus/TLS server listening on {address} (mutual TLS: {mutual})");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let slaves = slaves.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("Modbus/TLS handshake with {peer} failed: {e}");
                    return;
                }
            };
            log::debug!("Modbus/TLS connection accepted from {peer}");
            if let Err(e) = handle_connection(tls_stream, slaves).await {
                log::warn!("Modbus/TLS connection from {peer} ended with error: {e}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: tokio_rustls::server::TlsStream<tokio::net::TcpStream>,
    slaves: Arc<SlaveTable>,
) -> Result<()> {
    loop {
        let Some(request) = read_mbap_frame(&mut stream).await? else {
            return Ok(());
        };
        let unit_id = request[6];
        let response =
            slaves.with_slave_mut(unit_id, |slave| respond(slave, &request, ModbusProto::TcpUdp));
        match response {
            Ok(Some(bytes)) => stream.write_all(&bytes).await?,
            Ok(None) => {}
            Err(e) => log::error!("Modbus/TLS request from unit {unit_id} failed: {e}"),
        }
    }
}
