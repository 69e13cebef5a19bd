// Delegation dispatch - connector/channel traits + HTTPS implementation

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Error;
use crate::resolve::DelegationParams;

/// Wire form of a delegation request.
#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "PascalCase")]
pub struct DelegateRequest {
    pub name: String,
    pub password: String,
    pub uses: u32,
    pub time: String,
    pub users: Vec<String>,
    pub labels: Vec<String>,
}

impl DelegateRequest {
    pub fn from_params(params: &DelegationParams) -> Self {
        Self {
            name: params.user.clone(),
            password: String::from_utf8_lossy(&params.password).into_owned(),
            uses: params.uses,
            time: params.duration.clone(),
            users: params.owners.clone(),
            labels: params.labels.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseData {
    status: String,
    #[serde(default)]
    response: Option<String>,
}

impl ResponseData {
    fn acknowledgement(self) -> String {
        let body = self
            .response
            .map(|encoded| match STANDARD.decode(&encoded) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => encoded,
            })
            .unwrap_or_default();
        if body.trim().is_empty() {
            self.status
        } else {
            body
        }
    }
}

/// Opens a channel to a delegation server.
pub trait Connector {
    type Channel: Channel;

    fn connect(&self, server: &str, ca_file: &str) -> Result<Self::Channel, Error>;
}

/// A connected, single-use session. Sending consumes it.
#[allow(async_fn_in_trait)]
pub trait Channel {
    async fn delegate(self, request: &DelegateRequest) -> Result<String, Error>;
}

/// Which roots the TLS verifier trusts.
enum TrustRoots {
    /// The platform trust store.
    System,
    /// Only the given CA bundle; built-in roots are disabled.
    Pinned(reqwest::Certificate),
}

impl TrustRoots {
    fn load(ca_file: &str) -> Result<Self, Error> {
        if ca_file.is_empty() {
            return Ok(TrustRoots::System);
        }
        let pem = std::fs::read(ca_file)
            .map_err(|e| Error::Connection(format!("reading CA file {}: {}", ca_file, e)))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| Error::Connection(format!("invalid CA file {}: {}", ca_file, error_chain(&e))))?;
        Ok(TrustRoots::Pinned(cert))
    }

    fn built_in_roots(&self) -> bool {
        matches!(self, TrustRoots::System)
    }

    fn apply(self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let builder = builder.tls_built_in_root_certs(self.built_in_roots());
        match self {
            TrustRoots::System => builder,
            TrustRoots::Pinned(cert) => builder.add_root_certificate(cert),
        }
    }
}

/// Connects over HTTPS. A CA bundle, when given, is the only trusted root;
/// otherwise the system trust store is used.
pub struct Https;

impl Connector for Https {
    type Channel = RemoteServer;

    fn connect(&self, server: &str, ca_file: &str) -> Result<RemoteServer, Error> {
        let client = TrustRoots::load(ca_file)?
            .apply(reqwest::Client::builder())
            .build()
            .map_err(|e| Error::Connection(format!("TLS setup failed: {}", error_chain(&e))))?;

        tracing::info!(server, ca_file, "delegation client ready");
        Ok(RemoteServer {
            client,
            url: format!("https://{}/delegate", server),
        })
    }
}

pub struct RemoteServer {
    client: reqwest::Client,
    url: String,
}

impl RemoteServer {
    #[cfg(test)]
    fn at(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/delegate", base_url),
        }
    }
}

/// Render an error with every `source()` below it, joined by `: `.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::Connection(error_chain(&e))
    } else {
        Error::Dispatch(error_chain(&e))
    }
}

impl Channel for RemoteServer {
    async fn delegate(self, request: &DelegateRequest) -> Result<String, Error> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        tracing::debug!(%status, bytes = body.len(), "delegation response received");

        if !status.is_success() {
            return Err(Error::Dispatch(format!(
                "server returned {}: {}",
                status,
                String::from_utf8_lossy(&body).trim()
            )));
        }

        let data: ResponseData = serde_json::from_slice(&body)
            .map_err(|e| Error::Dispatch(format!("malformed response: {}", e)))?;
        if data.status != "ok" {
            return Err(Error::Dispatch(data.status));
        }
        Ok(data.acknowledgement())
    }
}

/// Send one delegation request over `channel`. No retries.
pub async fn dispatch<C: Channel>(channel: C, params: &DelegationParams) -> Result<String, Error> {
    let request = DelegateRequest::from_params(params);
    tracing::info!(
        user = %request.name,
        uses = request.uses,
        time = %request.time,
        labels = ?request.labels,
        users = ?request.users,
        "sending delegation request"
    );
    channel.delegate(&request).await
}
