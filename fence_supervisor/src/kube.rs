//! Minimal cluster-API client.
//!
//! Only the three calls the marker backend needs: read a `Node`, read the
//! `nnfnodes/nnf-nlc` custom resource, and patch that resource's status
//! subresource. HTTP status codes are classified here so nothing above this
//! layer sees a raw transport error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use fence_core::{FenceError, Result};

pub const NNF_GROUP: &str = "nnf.cray.hpe.com";
pub const NNF_PLURAL: &str = "nnfnodes";
/// Every storage node namespace holds exactly one `NnfNode`, always named this.
pub const NNF_NODE_NAME: &str = "nnf-nlc";

const MERGE_PATCH: &str = "application/merge-patch+json";

// ---------------------------------------------------------------------
// Resource shapes
// ---------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

impl Node {
    /// A node with the condition `Ready=True`. Missing status or conditions
    /// mean not ready.
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.kind == "Ready" && c.status == "True")
            })
            .unwrap_or(false)
    }

    pub fn with_ready(ready: bool) -> Self {
        Node {
            status: Some(NodeStatus {
                conditions: vec![NodeCondition {
                    kind: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                }],
            }),
        }
    }
}

/// Read `status.fenced` off an `NnfNode`. A resource without the field is
/// not fenced.
pub fn fenced_flag(nnf_node: &Value) -> Result<bool> {
    match nnf_node.get("status").and_then(|s| s.get("fenced")) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(FenceError::Malformed(format!(
            "status.fenced is not a boolean: {other}"
        ))),
    }
}

pub fn set_fenced_flag(nnf_node: &mut Value, fenced: bool) -> Result<()> {
    let obj = nnf_node
        .as_object_mut()
        .ok_or_else(|| FenceError::Malformed("NnfNode is not an object".to_string()))?;
    let status = obj
        .entry("status")
        .or_insert_with(|| Value::Object(Default::default()));
    if status.is_null() {
        *status = Value::Object(Default::default());
    }
    let status = status
        .as_object_mut()
        .ok_or_else(|| FenceError::Malformed("NnfNode status is not an object".to_string()))?;
    status.insert("fenced".to_string(), Value::Bool(fenced));
    Ok(())
}

// ---------------------------------------------------------------------
// API seam
// ---------------------------------------------------------------------

/// The cluster-API calls the marker backend depends on.
pub trait ClusterApi {
    fn read_node(&self, name: &str) -> Result<Node>;

    fn get_nnf_node(&self, namespace: &str, version: &str) -> Result<Value>;

    /// Write back the status of a previously read `NnfNode`.
    fn patch_nnf_node_status(&self, namespace: &str, version: &str, nnf_node: &Value)
        -> Result<()>;
}

impl<T: ClusterApi + ?Sized> ClusterApi for &T {
    fn read_node(&self, name: &str) -> Result<Node> {
        (**self).read_node(name)
    }

    fn get_nnf_node(&self, namespace: &str, version: &str) -> Result<Value> {
        (**self).get_nnf_node(namespace, version)
    }

    fn patch_nnf_node_status(
        &self,
        namespace: &str,
        version: &str,
        nnf_node: &Value,
    ) -> Result<()> {
        (**self).patch_nnf_node_status(namespace, version, nnf_node)
    }
}

// ---------------------------------------------------------------------
// Endpoint configuration
// ---------------------------------------------------------------------

/// Where the API server lives and how to authenticate to it.
#[derive(Clone, Debug, Default)]
pub struct KubeEndpoint {
    /// Base URL, e.g. `https://10.0.0.1:6443`.
    pub server: String,
    pub token: Option<String>,
    /// PEM bundle used to verify the server.
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl KubeEndpoint {
    /// Explicit host/port with a service-account token and CA file.
    pub fn from_service_account(
        host: &str,
        port: u16,
        token_file: &Path,
        cert_file: &Path,
    ) -> Result<Self> {
        let token = std::fs::read_to_string(token_file).map_err(|e| {
            FenceError::Backend(format!("reading token file {}: {e}", token_file.display()))
        })?;
        let ca_pem = std::fs::read(cert_file).map_err(|e| {
            FenceError::Backend(format!("reading cert file {}: {e}", cert_file.display()))
        })?;
        Ok(Self {
            server: format!("https://{host}:{port}"),
            token: Some(token.trim().to_string()),
            ca_pem: Some(ca_pem),
            insecure_skip_tls_verify: false,
        })
    }

    /// Load the current context of a kubeconfig file.
    ///
    /// Only bearer-token users are supported.
    pub fn from_kubeconfig(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_kubeconfig_path()
                .ok_or_else(|| FenceError::Backend("no kubeconfig path".to_string()))?,
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            FenceError::Backend(format!("reading kubeconfig {}: {e}", path.display()))
        })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        KubeConfigFile::parse(&raw)?.endpoint(&base)
    }
}

fn default_kubeconfig_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("KUBECONFIG") {
        if let Some(first) = std::env::split_paths(&p).next() {
            return Some(first);
        }
    }
    std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".kube").join("config"))
}

#[derive(Debug, Deserialize)]
struct KubeConfigFile {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<Named<KubeCluster>>,
    #[serde(default)]
    contexts: Vec<Named<KubeContext>>,
    #[serde(default)]
    users: Vec<Named<KubeUser>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    item: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeCluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct KubeContext {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KubeUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "tokenFile", default)]
    token_file: Option<PathBuf>,
}

impl KubeConfigFile {
    fn parse(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| FenceError::Malformed(format!("kubeconfig: {e}")))
    }

    fn endpoint(&self, base: &Path) -> Result<KubeEndpoint> {
        let ctx_name = self
            .current_context
            .as_deref()
            .ok_or_else(|| FenceError::Malformed("kubeconfig has no current-context".into()))?;
        let ctx = find(&self.contexts, ctx_name, "context")?;
        let cluster = find(&self.clusters, &ctx.cluster, "cluster")?;

        let ca_pem = match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(data.trim())
                    .map_err(|e| FenceError::Malformed(format!("certificate-authority-data: {e}")))?,
            ),
            (None, Some(file)) => Some(std::fs::read(base.join(file)).map_err(|e| {
                FenceError::Backend(format!("reading {}: {e}", file.display()))
            })?),
            (None, None) => None,
        };

        let token = match ctx.user.as_deref() {
            Some(user) => {
                let user = find(&self.users, user, "user")?;
                match (&user.token, &user.token_file) {
                    (Some(t), _) => Some(t.clone()),
                    (None, Some(file)) => Some(
                        std::fs::read_to_string(base.join(file))
                            .map_err(|e| {
                                FenceError::Backend(format!("reading {}: {e}", file.display()))
                            })?
                            .trim()
                            .to_string(),
                    ),
                    (None, None) => None,
                }
            }
            None => None,
        };

        Ok(KubeEndpoint {
            server: cluster.server.trim_end_matches('/').to_string(),
            token,
            ca_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

fn find<'a, T>(items: &'a [Named<T>], name: &str, what: &'static str) -> Result<&'a T> {
    items
        .iter()
        .find(|n| n.name == name)
        .map(|n| &n.item)
        .ok_or_else(|| FenceError::Malformed(format!("kubeconfig {what} {name} not defined")))
}

// ---------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------

pub struct KubeClient {
    http: Client,
    server: String,
    token: Option<String>,
    timeout: Duration,
}

impl KubeClient {
    pub fn new(endpoint: KubeEndpoint, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(pem) = &endpoint.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| FenceError::Malformed(format!("CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        if endpoint.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| FenceError::Backend(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            server: endpoint.server.trim_end_matches('/').to_string(),
            token: endpoint.token,
            timeout,
        })
    }

    fn nnf_node_url(&self, namespace: &str, version: &str) -> String {
        format!(
            "{}/apis/{NNF_GROUP}/{version}/namespaces/{namespace}/{NNF_PLURAL}/{NNF_NODE_NAME}",
            self.server
        )
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(ACCEPT, "application/json");
        match &self.token {
            Some(t) => req.header(AUTHORIZATION, format!("Bearer {t}")),
            None => req,
        }
    }

    fn send(&self, req: RequestBuilder, kind: &'static str, name: &str) -> Result<Response> {
        let resp = self
            .authorized(req)
            .send()
            .map_err(|e| self.transport_error(e, kind, name))?;
        match classify_status(resp.status(), kind, name) {
            Some(err) => Err(err),
            None => Ok(resp),
        }
    }

    /// Failures below HTTP: no status code was received.
    fn transport_error(&self, e: reqwest::Error, kind: &'static str, name: &str) -> FenceError {
        if e.is_timeout() {
            FenceError::timeout(format!("{kind} {name}"), self.timeout)
        } else if e.is_connect() {
            FenceError::ConnectionLost(format!("{}: {e}", self.server))
        } else {
            FenceError::Backend(format!("{kind} {name}: {e}"))
        }
    }
}

impl ClusterApi for KubeClient {
    fn read_node(&self, name: &str) -> Result<Node> {
        debug!(node = %name, "reading node resource");
        let url = format!("{}/api/v1/nodes/{name}", self.server);
        let resp = self.send(self.http.get(url), "node", name)?;
        resp.json()
            .map_err(|e| FenceError::Malformed(format!("node {name}: {e}")))
    }

    fn get_nnf_node(&self, namespace: &str, version: &str) -> Result<Value> {
        debug!(%namespace, %version, "reading NNF node resource");
        let name = format!("{namespace}/{NNF_NODE_NAME}");
        let resp = self.send(
            self.http.get(self.nnf_node_url(namespace, version)),
            "NNF node",
            &name,
        )?;
        resp.json()
            .map_err(|e| FenceError::Malformed(format!("NNF node {name}: {e}")))
    }

    fn patch_nnf_node_status(
        &self,
        namespace: &str,
        version: &str,
        nnf_node: &Value,
    ) -> Result<()> {
        let name = format!("{namespace}/{NNF_NODE_NAME}");
        let body = status_patch(nnf_node);
        debug!(%name, %body, "patching NNF node status");
        let url = format!("{}/status", self.nnf_node_url(namespace, version));
        self.send(
            self.http
                .patch(url)
                .header(CONTENT_TYPE, MERGE_PATCH)
                .body(body.to_string()),
            "NNF node",
            &name,
        )?;
        Ok(())
    }
}

/// Merge patch carrying the new status and the resource version it was
/// derived from, so a concurrent writer yields 409 instead of a lost update.
pub fn status_patch(nnf_node: &Value) -> Value {
    let mut patch = json!({ "status": nnf_node.get("status").cloned().unwrap_or(Value::Null) });
    if let Some(rv) = nnf_node
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
    {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

/// Map an HTTP status to the failure taxonomy; `None` for success.
pub fn classify_status(status: StatusCode, kind: &'static str, name: &str) -> Option<FenceError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED => FenceError::LoginDenied(format!("reading {kind} {name}")),
        StatusCode::FORBIDDEN => FenceError::Forbidden(format!("{kind} {name}")),
        StatusCode::NOT_FOUND => FenceError::NotFound {
            kind,
            name: name.to_string(),
        },
        StatusCode::CONFLICT => FenceError::Conflict(format!("{kind} {name}")),
        other => FenceError::Backend(format!("{kind} {name}: HTTP {other}")),
    })
}
