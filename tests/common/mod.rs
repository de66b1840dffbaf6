//! Shared utilities for the transport integration tests.
#![allow(dead_code)]

use std::io::Read;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme, StreamOwned};

use tls_netlayer::credentials::Fallback;
use tls_netlayer::{NetworkLayer, PluginConfig, ThreadContext, TlsPlugin, TlsTransport, Transfer};

pub type Client = StreamOwned<ClientConnection, UnixStream>;

pub fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture_config() -> PluginConfig {
    let mut config = PluginConfig::default();
    config.tls.certificate_file = Some("server.pem".into());
    config.tls.private_key_file = Some("server.key".into());
    config
}

/// A plugin on the fixture credentials, without built-in fallbacks.
pub fn plugin() -> Arc<TlsPlugin> {
    plugin_with(fixture_config())
}

pub fn plugin_with(config: PluginConfig) -> Arc<TlsPlugin> {
    Arc::new(TlsPlugin::from_config(config, &fixtures(), Fallback::none()).unwrap())
}

/// Accepts any server certificate. Test use only.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

pub fn client_config() -> Arc<ClientConfig> {
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .dangerous()
    .with_custom_certificate_verifier(Arc::new(NoVerifier))
    .with_no_client_auth();
    Arc::new(config)
}

/// A connected socket pair: the client end wrapped in a rustls client, the
/// server end handed over as a raw descriptor.
pub fn connect(config: &Arc<ClientConfig>) -> (Client, RawFd) {
    let (client, server) = UnixStream::pair().unwrap();
    client.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    server.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    let conn = ClientConnection::new(Arc::clone(config), name).unwrap();
    (StreamOwned::new(conn, client), server.into_raw_fd())
}

/// Switch a descriptor handed to the server between blocking and non-blocking.
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) {
    // SAFETY: `fd` is a live socket; ownership goes straight back out below.
    let stream = unsafe { UnixStream::from_raw_fd(fd) };
    stream.set_nonblocking(nonblocking).unwrap();
    let _ = stream.into_raw_fd();
}

/// Run `f` on a fresh worker thread holding its own context.
pub fn on_worker<F, T>(plugin: &Arc<TlsPlugin>, f: F) -> JoinHandle<T>
where
    F: FnOnce(&TlsTransport, &mut ThreadContext) -> T + Send + 'static,
    T: Send + 'static,
{
    let plugin = Arc::clone(plugin);
    thread::spawn(move || {
        let mut ctx = plugin.worker_init().unwrap();
        let transport = plugin.transport();
        f(&transport, &mut ctx)
    })
}

/// Read exactly `n` plaintext bytes on the server side.
pub fn server_read(transport: &TlsTransport, ctx: &mut ThreadContext, fd: RawFd, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while out.len() < n {
        match transport.read(ctx, fd, &mut buf).unwrap() {
            Transfer::Ready(k) => out.extend_from_slice(&buf[..k]),
            other => panic!("unexpected read outcome: {other:?}"),
        }
    }
    out
}

/// Echo `n` bytes back and close.
pub fn echo(transport: &TlsTransport, ctx: &mut ThreadContext, fd: RawFd, n: usize) {
    let request = server_read(transport, ctx, fd, n);
    assert_eq!(transport.write(ctx, fd, &request).unwrap(), Transfer::Ready(n));
    assert!(transport.close(ctx, fd));
}

/// Everything the server sends up to its `close_notify`.
pub fn read_to_end(client: &mut Client) -> Vec<u8> {
    let mut out = Vec::new();
    client.read_to_end(&mut out).unwrap();
    out
}
