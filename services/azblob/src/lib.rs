//! A narrow, typed client facade over Azure-style blob storage.
//!
//! This crate wraps the handful of operations applications actually need
//! against a container/blob store: upload, download, delete, hierarchical
//! paginated listing, and time-limited shared-access URI issuance. The
//! transport is injected through [`blobway_core::Context`]; retries for
//! transient transport failures are bounded by a configurable count and
//! the transport's own per-request timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use blobway_azblob::BlobClient;
//! use blobway_core::Context;
//! use blobway_http_send_reqwest::ReqwestHttpSend;
//! use bytes::Bytes;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> blobway_core::Result<()> {
//!     let ctx = Context::new().with_http_send(ReqwestHttpSend::default());
//!     let client = BlobClient::new(
//!         "AccountName=account;AccountKey=a2V5;BlobEndpoint=https://account.blob.core.windows.net",
//!         ctx,
//!     )?;
//!
//!     let cancel = CancellationToken::new();
//!     let body = futures::stream::once(async { Ok(Bytes::from_static(b"a,b\n1,2")) });
//!     let meta = client
//!         .upload("reports", "jan/summary.csv", Box::pin(body), true, &cancel)
//!         .await?;
//!     println!("uploaded, etag {}", meta.etag);
//!     Ok(())
//! }
//! ```

mod config;
pub use config::Config;

mod connection_string;
mod constants;

mod credential;
pub use credential::Credential;

mod sas;
pub use sas::Permissions;
pub use sas::SasAuthorization;
pub use sas::SasResource;

mod signer;

mod list;
pub use list::BlobItem;
pub use list::ListEntry;
pub use list::ListOptions;
pub use list::ListingPage;
pub use list::Pager;

mod client;
pub use client::BlobClient;
pub use client::BlobMetadata;
pub use client::DeleteResult;
pub use client::TransferResult;
