use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::request::Parts;
use http::{header, Method, StatusCode, Uri};
use log::{debug, error};
use percent_encoding::utf8_percent_encode;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use blobway_core::time::{self, DateTime};
use blobway_core::{Context, Error, Result};

use crate::config::DEFAULT_MAX_RETRIES;
use crate::constants::*;
use crate::list::{self, ListOptions, ListingPage, Pager};
use crate::sas::{SasAuthorization, ServiceSharedAccessSignature};
use crate::signer::RequestSigner;
use crate::{Config, Credential, Permissions, SasResource};

/// Metadata of a stored object, collected from response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    /// Entity tag of the object version the operation observed.
    pub etag: String,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime>,
    /// Object size in bytes.
    pub content_length: u64,
}

/// Outcome of a download.
#[derive(Debug)]
pub struct TransferResult {
    /// Final status returned by the service.
    pub status: StatusCode,
    /// Metadata of the transferred object.
    pub metadata: BlobMetadata,
    /// Bytes handed to the caller's writer.
    pub bytes_written: u64,
}

/// Outcome of a delete.
#[derive(Debug)]
pub struct DeleteResult {
    /// Final status returned by the service.
    pub status: StatusCode,
    /// Service-side request id, when the service reported one.
    pub request_id: Option<String>,
}

/// A client facade over one blob storage connection.
///
/// Cloning is cheap and clones share the underlying transport; a single
/// client can serve concurrent callers.
#[derive(Clone, Debug)]
pub struct BlobClient {
    credential: Option<Credential>,
    ctx: Context,
    signer: RequestSigner,
    endpoint: String,
    max_retries: usize,
    network_timeout: std::time::Duration,
}

impl BlobClient {
    /// Build a client from a storage connection string.
    ///
    /// Parsing happens eagerly so malformed input fails here, not on the
    /// first operation. No network call is made.
    pub fn new(conn_str: &str, ctx: Context) -> Result<Self> {
        Self::with_max_retries(conn_str, ctx, DEFAULT_MAX_RETRIES)
    }

    /// Build a client with an explicit bound on transient-failure retries.
    pub fn with_max_retries(conn_str: &str, ctx: Context, max_retries: usize) -> Result<Self> {
        let mut config = Config::try_from_connection_string(conn_str)?;
        config.max_retries = max_retries;
        Self::from_config(config, ctx)
    }

    /// Build a client from an already collected config.
    pub fn from_config(config: Config, ctx: Context) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::config_invalid("endpoint is required"))?
            .trim_end_matches('/')
            .to_string();

        let credential = Credential::from_config(&config);
        let network_timeout = ctx.timeout();

        Ok(Self {
            credential,
            ctx,
            signer: RequestSigner::new(),
            endpoint,
            max_retries: config.max_retries,
            network_timeout,
        })
    }

    /// Upload an object from a stream of chunks.
    ///
    /// With `overwrite` set the new content replaces any existing object;
    /// without it an existing object makes the upload fail with a conflict
    /// and the stored content stays untouched.
    pub async fn upload(
        &self,
        container: &str,
        path: &str,
        body: impl Stream<Item = Result<Bytes>> + Send + Unpin,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadata> {
        self.upload_inner(container, path, body, overwrite, cancel)
            .await
            .map_err(|err| {
                error!("upload of {container}/{path} failed: {err:?}");
                err
            })
    }

    async fn upload_inner(
        &self,
        container: &str,
        path: &str,
        mut body: impl Stream<Item = Result<Bytes>> + Send + Unpin,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<BlobMetadata> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            if cancel.is_cancelled() {
                return Err(Error::cancelled("upload cancelled by caller"));
            }
            buf.extend_from_slice(&chunk?);
        }
        let content = buf.freeze();
        let content_length = content.len() as u64;

        let mut builder = http::Request::builder()
            .method(Method::PUT)
            .uri(self.blob_url(container, path))
            .header(X_MS_BLOB_TYPE, "BlockBlob")
            .header(header::CONTENT_LENGTH, content.len());
        if !overwrite {
            // The service rejects the write atomically when the object
            // already exists, so no existence pre-check is needed here.
            builder = builder.header(header::IF_NONE_MATCH, "*");
        }
        let req = builder.body(content)?;

        let resp = self.send(req, cancel).await?;
        match resp.status() {
            StatusCode::CREATED => {}
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
                // The service's own message passes through untranslated.
                let message = String::from_utf8_lossy(resp.body()).to_string();
                return Err(Error::conflict(if message.is_empty() {
                    format!("blob {path} already exists in container {container}")
                } else {
                    message
                }));
            }
            status => return Err(unexpected_status("upload", status, resp.body())),
        }

        Ok(BlobMetadata {
            etag: header_string(resp.headers(), header::ETAG.as_str()).unwrap_or_default(),
            last_modified: parse_last_modified(resp.headers()),
            content_length,
        })
    }

    /// Download an object into the caller's writer.
    ///
    /// The container and the object are checked for existence first; an
    /// absent container fails without touching the object at all.
    pub async fn download(
        &self,
        container: &str,
        path: &str,
        writer: &mut (impl AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        self.download_inner(container, path, writer, cancel)
            .await
            .map_err(|err| {
                error!("download of {container}/{path} failed: {err:?}");
                err
            })
    }

    async fn download_inner(
        &self,
        container: &str,
        path: &str,
        writer: &mut (impl AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        self.require_blob(container, path, cancel).await?;

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(self.blob_url(container, path))
            .body(Bytes::new())?;
        let resp = self.send(req, cancel).await?;
        if resp.status() != StatusCode::OK {
            return Err(unexpected_status("download", resp.status(), resp.body()));
        }

        writer.write_all(resp.body()).await?;
        writer.flush().await?;

        let bytes_written = resp.body().len() as u64;
        Ok(TransferResult {
            status: resp.status(),
            metadata: BlobMetadata {
                etag: header_string(resp.headers(), header::ETAG.as_str()).unwrap_or_default(),
                last_modified: parse_last_modified(resp.headers()),
                content_length: bytes_written,
            },
            bytes_written,
        })
    }

    /// Delete an object.
    ///
    /// The same existence pre-checks as [`download`](Self::download) apply.
    pub async fn delete(
        &self,
        container: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteResult> {
        self.delete_inner(container, path, cancel)
            .await
            .map_err(|err| {
                error!("delete of {container}/{path} failed: {err:?}");
                err
            })
    }

    async fn delete_inner(
        &self,
        container: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteResult> {
        self.require_blob(container, path, cancel).await?;

        let req = http::Request::builder()
            .method(Method::DELETE)
            .uri(self.blob_url(container, path))
            .body(Bytes::new())?;
        let resp = self.send(req, cancel).await?;
        if resp.status() != StatusCode::ACCEPTED {
            return Err(unexpected_status("delete", resp.status(), resp.body()));
        }

        Ok(DeleteResult {
            status: resp.status(),
            request_id: header_string(resp.headers(), X_MS_REQUEST_ID),
        })
    }

    /// Start a lazy hierarchical listing of a container.
    ///
    /// No request is made until the first page is pulled.
    pub fn list(
        &self,
        container: &str,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> Pager {
        Pager::new(
            self.clone(),
            container.to_string(),
            options,
            cancel.clone(),
        )
    }

    pub(crate) async fn fetch_page(
        &self,
        container: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
        marker: Option<&str>,
        page_size_hint: usize,
        cancel: &CancellationToken,
    ) -> Result<ListingPage> {
        let mut query = vec![
            ("restype".to_string(), "container".to_string()),
            ("comp".to_string(), "list".to_string()),
        ];
        if let Some(prefix) = prefix {
            query.push(("prefix".to_string(), prefix.to_string()));
        }
        if let Some(delimiter) = delimiter {
            query.push(("delimiter".to_string(), delimiter.to_string()));
        }
        if let Some(marker) = marker {
            query.push(("marker".to_string(), marker.to_string()));
        }
        query.push(("maxresults".to_string(), page_size_hint.to_string()));

        let query = query
            .iter()
            .map(|(k, v)| {
                format!("{k}={}", utf8_percent_encode(v, &AZURE_QUERY_ENCODE_SET))
            })
            .collect::<Vec<_>>()
            .join("&");

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(format!("{}/{container}?{query}", self.endpoint))
            .body(Bytes::new())?;
        let resp = self.send(req, cancel).await?;
        if resp.status() != StatusCode::OK {
            let err = unexpected_status("list", resp.status(), resp.body());
            error!("listing container {container} failed: {err:?}");
            return Err(err);
        }

        let body = String::from_utf8_lossy(resp.body());
        list::decode_page(&body)
    }

    /// Issue a time-limited shared-access URI over a whole container.
    ///
    /// An absent container is an error; a credential that cannot sign
    /// (SAS token, anonymous) yields `Ok(None)` instead. Passing a stored
    /// policy identifier defers permissions and expiry to the policy.
    pub async fn container_sas_uri(
        &self,
        container: &str,
        permissions: Permissions,
        stored_policy: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Uri>> {
        self.sas_uri_inner(container, None, permissions, stored_policy, cancel)
            .await
            .map_err(|err| {
                error!("issuing container grant for {container} failed: {err:?}");
                err
            })
    }

    /// Issue a time-limited shared-access URI over a single object.
    ///
    /// Same credential semantics as [`container_sas_uri`](Self::container_sas_uri);
    /// additionally the object itself must exist.
    pub async fn blob_sas_uri(
        &self,
        container: &str,
        path: &str,
        permissions: Permissions,
        stored_policy: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Uri>> {
        self.sas_uri_inner(container, Some(path), permissions, stored_policy, cancel)
            .await
            .map_err(|err| {
                error!("issuing blob grant for {container}/{path} failed: {err:?}");
                err
            })
    }

    async fn sas_uri_inner(
        &self,
        container: &str,
        path: Option<&str>,
        permissions: Permissions,
        stored_policy: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Uri>> {
        match path {
            Some(path) => self.require_blob(container, path, cancel).await?,
            None => self.require_container(container, cancel).await?,
        }

        let (account, key) = match &self.credential {
            Some(
                cred @ Credential::SharedKey {
                    account_name,
                    account_key,
                },
            ) if cred.can_sign() => (account_name, account_key),
            _ => {
                debug!("credential cannot sign shared-access grants, no URI issued");
                return Ok(None);
            }
        };

        let (resource, canonicalized_resource, url) = match path {
            Some(path) => (
                SasResource::Blob,
                format!("/blob/{account}/{container}/{path}"),
                self.blob_url(container, path),
            ),
            None => (
                SasResource::Container,
                format!("/blob/{account}/{container}"),
                format!("{}/{container}", self.endpoint),
            ),
        };

        // A stored policy owns permissions and expiry, so ad-hoc inputs do
        // not reach the token in that mode.
        let authorization = match stored_policy {
            Some(identifier) => SasAuthorization::StoredPolicy {
                identifier: identifier.to_string(),
            },
            None => SasAuthorization::AdHoc {
                permissions,
                expires_on: time::now() + chrono::TimeDelta::hours(1),
            },
        };

        let token = ServiceSharedAccessSignature::new(
            account.clone(),
            key.clone(),
            resource,
            canonicalized_resource,
            authorization,
        )
        .token()?;

        let query = token
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Ok(Some(format!("{url}?{query}").parse::<Uri>()?))
    }

    /// Whether a container exists.
    pub async fn container_exists(
        &self,
        container: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let req = http::Request::builder()
            .method(Method::HEAD)
            .uri(format!("{}/{container}?restype=container", self.endpoint))
            .body(Bytes::new())?;
        self.head_exists(req, cancel).await
    }

    /// Whether an object exists.
    pub async fn blob_exists(
        &self,
        container: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let req = http::Request::builder()
            .method(Method::HEAD)
            .uri(self.blob_url(container, path))
            .body(Bytes::new())?;
        self.head_exists(req, cancel).await
    }

    async fn head_exists(
        &self,
        req: http::Request<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let resp = self.send(req, cancel).await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(unexpected_status("existence check", status, resp.body())),
        }
    }

    async fn require_container(&self, container: &str, cancel: &CancellationToken) -> Result<()> {
        if !self.container_exists(container, cancel).await? {
            return Err(Error::not_found(format!(
                "container {container} does not exist"
            )));
        }
        Ok(())
    }

    async fn require_blob(
        &self,
        container: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.require_container(container, cancel).await?;
        if !self.blob_exists(container, path, cancel).await? {
            return Err(Error::not_found(format!(
                "blob {path} does not exist in container {container}"
            )));
        }
        Ok(())
    }

    /// Send a request, signing each attempt and retrying transient
    /// transport failures up to the configured bound. Every attempt is
    /// capped by the transport's own timeout; cancellation wins over an
    /// in-flight attempt.
    async fn send(
        &self,
        req: http::Request<Bytes>,
        cancel: &CancellationToken,
    ) -> Result<http::Response<Bytes>> {
        let (parts, body) = req.into_parts();
        let mut attempt = 0;

        loop {
            // Signed per attempt so the date header stays fresh.
            let mut attempt_parts = clone_parts(&parts);
            self.signer
                .sign(&mut attempt_parts, self.credential.as_ref())?;
            let req = http::Request::from_parts(attempt_parts, body.clone());

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled("operation cancelled by caller"));
                }
                outcome = tokio::time::timeout(self.network_timeout, self.ctx.http_send(req)) => {
                    match outcome {
                        Ok(result) => result,
                        Err(elapsed) => Err(Error::unexpected(format!(
                            "request timed out after {:?}",
                            self.network_timeout
                        ))
                        .with_source(elapsed)),
                    }
                }
            };

            match outcome {
                Ok(resp) => {
                    if attempt < self.max_retries && is_transient_status(resp.status()) {
                        attempt += 1;
                        debug!(
                            "retrying after status {} (attempt {attempt}/{})",
                            resp.status(),
                            self.max_retries
                        );
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && err.is_transient() {
                        attempt += 1;
                        debug!(
                            "retrying after transport error (attempt {attempt}/{}): {err:?}",
                            self.max_retries
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn blob_url(&self, container: &str, path: &str) -> String {
        format!(
            "{}/{container}/{}",
            self.endpoint,
            utf8_percent_encode(path, &AZURE_QUERY_ENCODE_SET)
        )
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::REQUEST_TIMEOUT
    )
}

fn unexpected_status(op: &str, status: StatusCode, body: &Bytes) -> Error {
    Error::unexpected(format!(
        "{op} failed with status {status}: {}",
        String::from_utf8_lossy(body)
    ))
}

fn header_string(headers: &http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn parse_last_modified(headers: &http::HeaderMap) -> Option<DateTime> {
    header_string(headers, header::LAST_MODIFIED.as_str())
        .and_then(|v| time::parse_rfc2822(&v).ok())
}

// http::request::Parts is not Clone, so rebuild what signing may touch.
fn clone_parts(parts: &Parts) -> Parts {
    let (mut out, _) = http::Request::new(()).into_parts();
    out.method = parts.method.clone();
    out.uri = parts.uri.clone();
    out.version = parts.version;
    out.headers = parts.headers.clone();
    out
}
