use std::{
    error::Error,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode, Version};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::{TokioExecutor, TokioIo};
use pkcs8::{der::pem::LineEnding, pkcs5::pbes2, PrivateKeyInfo};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose,
};
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName},
    ClientConfig, RootCertStore,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::{
    config::{Protocol, ServerSettings, SslSettings},
    errors::PorticoError,
    server::{
        resolver::MemoryResolver,
        router::{handler_fn, Router},
        tls::crypto_provider,
    },
};

pub(crate) type BoxError = Box<dyn Error + Send + Sync>;
pub(crate) type TestResult = Result<(), BoxError>;

pub(crate) const IDENTITY: &str = "resource://localhost/ssl/identity.pem";
pub(crate) const TRUST: &str = "resource://localhost/ssl/trust.pem";
pub(crate) const CLIENT_SUBJECT: &str = "CN=hexagonkt.com";

pub(crate) fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .try_init();
}

/// A client identity: leaf certificate and its key.
pub(crate) struct Identity {
    pub certificate: CertificateDer<'static>,
    pub key: Vec<u8>,
}

impl Identity {
    fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            self.key
                .clone(),
        ))
    }
}

/// Throwaway PKI: a CA, a server certificate for `localhost` and two client
/// certificates, one of them issued by an unrelated CA.
pub(crate) struct Pki {
    pub ca_pem: String,
    pub ca_der: CertificateDer<'static>,
    pub server_pem: String,
    server_certificate_pem: String,
    server_key: Vec<u8>,
    pub client: Identity,
    pub untrusted_client: Identity,
}

fn ca(common_name: &str) -> Result<(CertificateParams, KeyPair, rcgen::Certificate), BoxError> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::new())?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::CrlSign,
    ];
    let certificate = params.self_signed(&key_pair)?;
    Ok((params, key_pair, certificate))
}

fn client_identity(
    common_name: &str,
    issuer: &Issuer<'static, KeyPair>,
) -> Result<Identity, BoxError> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::new())?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let certificate = params.signed_by(&key_pair, issuer)?;
    Ok(Identity {
        certificate: certificate
            .der()
            .clone(),
        key: key_pair.serialize_der(),
    })
}

impl Pki {
    pub(crate) fn generate() -> Result<Self, BoxError> {
        let (ca_params, ca_key, ca_certificate) = ca("Portico Test CA")?;
        let ca_pem = ca_certificate.pem();
        let ca_der = ca_certificate
            .der()
            .clone();
        let issuer = Issuer::new(ca_params, ca_key);

        let server_key = KeyPair::generate()?;
        let mut server_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_certificate = server_params.signed_by(&server_key, &issuer)?;
        let server_certificate_pem = server_certificate.pem();
        let server_pem = format!("{}{}", server_certificate_pem, server_key.serialize_pem());

        let client = client_identity("hexagonkt.com", &issuer)?;

        let (rogue_params, rogue_key, _) = ca("Rogue CA")?;
        let rogue_issuer = Issuer::new(rogue_params, rogue_key);
        let untrusted_client = client_identity("hexagonkt.com", &rogue_issuer)?;

        Ok(Self {
            ca_pem,
            ca_der,
            server_pem,
            server_certificate_pem,
            server_key: server_key.serialize_der(),
            client,
            untrusted_client,
        })
    }

    /// Server identity with its key encrypted under `password` (PBES2).
    pub(crate) fn encrypted_server_pem(&self, password: &str) -> Result<String, BoxError> {
        let key = PrivateKeyInfo::try_from(self.server_key.as_slice()).map_err(|e| e.to_string())?;
        let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(2048, b"portico-test-salt", &[7; 16])
            .map_err(|e| e.to_string())?;
        let encrypted = key
            .encrypt_with_params(params, password)
            .map_err(|e| e.to_string())?;
        let key_pem = encrypted
            .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
            .map_err(|e| e.to_string())?;
        Ok(format!("{}{}", self.server_certificate_pem, key_pem.as_str()))
    }

    /// Resolver serving the server identity and the trust store, both
    /// guarded by the `localhost` password implied by their locations.
    pub(crate) fn resolver(&self) -> MemoryResolver {
        MemoryResolver::new()
            .with(
                IDENTITY,
                self.server_pem
                    .clone(),
                "localhost",
            )
            .with(
                TRUST,
                self.ca_pem
                    .clone(),
                "localhost",
            )
    }

    pub(crate) fn ssl_settings(&self, client_auth: bool) -> Result<SslSettings, PorticoError> {
        SslSettings::builder()
            .key_store(IDENTITY)
            .trust_store(TRUST)
            .client_auth(client_auth)
            .build()
    }

    pub(crate) fn server_settings(
        &self,
        protocol: Protocol,
        client_auth: bool,
    ) -> Result<ServerSettings, PorticoError> {
        ServerSettings::builder()
            .bind_port(0)
            .protocol(protocol)
            .ssl_settings(self.ssl_settings(client_auth)?)
            .build()
    }

    /// Client configuration trusting the test CA.
    pub(crate) fn client_config(
        &self,
        identity: Option<&Identity>,
        alpn: &[&[u8]],
    ) -> Result<Arc<ClientConfig>, BoxError> {
        let mut roots = RootCertStore::empty();
        roots.add(
            self.ca_der
                .clone(),
        )?;

        let builder = ClientConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(&[&rustls::version::TLS13])?
            .with_root_certificates(roots);

        let mut config = match identity {
            Some(identity) => builder.with_client_auth_cert(
                vec![identity
                    .certificate
                    .clone()],
                identity.private_key(),
            )?,
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = alpn
            .iter()
            .map(|protocol| protocol.to_vec())
            .collect();

        Ok(Arc::new(config))
    }
}

/// Router answering `GET /hello` with `Hello World!` and the client
/// certificate subject in the `cert` header. Counts handler invocations.
pub(crate) fn hello_router(calls: Arc<AtomicUsize>) -> Result<Router, PorticoError> {
    Router::builder()
        .get(
            "/hello",
            handler_fn(move |mut context| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let subject = context
                        .certificate()
                        .map(|certificate| {
                            certificate
                                .subject()
                                .to_string()
                        });
                    if let Some(subject) = subject {
                        context
                            .response_mut()
                            .set_header("cert", &subject)?;
                    }
                    context.ok("Hello World!")?;
                    Ok(context)
                }
            }),
        )
        .build()
}

/// What the test client saw.
#[derive(Debug)]
pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| {
                value
                    .to_str()
                    .ok()
            })
    }
}

/// Sends one request to `127.0.0.1:port`, over TLS when `tls` is given.
///
/// Speaks HTTP/2 when the TLS handshake selected `h2`, HTTP/1.1 otherwise.
pub(crate) async fn send(
    port: u16,
    method: Method,
    path: &str,
    body: &str,
    tls: Option<Arc<ClientConfig>>,
) -> Result<TestResponse, BoxError> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let body = Full::new(Bytes::from(body.to_string()));

    let Some(config) = tls else {
        let request = http::Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, format!("localhost:{}", port))
            .body(body)?;
        return http1_exchange(TokioIo::new(stream), request).await;
    };

    let connector = TlsConnector::from(config);
    let tls_stream = connector
        .connect(ServerName::try_from("localhost")?, stream)
        .await?;

    let h2 = tls_stream
        .get_ref()
        .1
        .alpn_protocol()
        == Some(b"h2".as_slice());

    if h2 {
        let request = http::Request::builder()
            .method(method)
            .uri(format!("https://localhost:{}{}", port, path))
            .body(body)?;
        http2_exchange(TokioIo::new(tls_stream), request).await
    } else {
        let request = http::Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, format!("localhost:{}", port))
            .body(body)?;
        http1_exchange(TokioIo::new(tls_stream), request).await
    }
}

pub(crate) async fn get(
    port: u16,
    path: &str,
    tls: Option<Arc<ClientConfig>>,
) -> Result<TestResponse, BoxError> {
    send(port, Method::GET, path, "", tls).await
}

async fn http1_exchange<T>(
    io: TokioIo<T>,
    request: http::Request<Full<Bytes>>,
) -> Result<TestResponse, BoxError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let response = sender
        .send_request(request)
        .await?;
    collect(response).await
}

async fn http2_exchange<T>(
    io: TokioIo<T>,
    request: http::Request<Full<Bytes>>,
) -> Result<TestResponse, BoxError>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) =
        hyper::client::conn::http2::handshake(TokioExecutor::new(), io).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let response = sender
        .send_request(request)
        .await?;
    collect(response).await
}

async fn collect(
    response: http::Response<hyper::body::Incoming>,
) -> Result<TestResponse, BoxError> {
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await?
        .to_bytes();

    Ok(TestResponse {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        body: String::from_utf8(body.to_vec())?,
    })
}
