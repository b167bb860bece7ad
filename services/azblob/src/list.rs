use blobway_core::time::{self, DateTime};
use blobway_core::{Error, Result};
use futures::Stream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::BlobClient;

/// Default page size hint when the caller supplies none.
pub const DEFAULT_PAGE_SIZE_HINT: usize = 10;

/// Options controlling a hierarchical listing.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Only names starting with this string are returned.
    pub prefix: Option<String>,
    /// Path delimiter (typically `/`). Names sharing a segment up to the
    /// delimiter collapse into a single virtual-folder entry per page.
    pub delimiter: Option<String>,
    /// Opaque continuation cursor from a previously observed page.
    pub continuation: Option<String>,
    /// Advisory page size; the server may return fewer or more entries.
    pub page_size_hint: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            delimiter: None,
            continuation: None,
            page_size_hint: DEFAULT_PAGE_SIZE_HINT,
        }
    }
}

/// One stored object in a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// Full object name, including any delimiter characters.
    pub name: String,
    /// Entity tag of the current object version.
    pub etag: Option<String>,
    /// Last modification timestamp.
    pub last_modified: Option<DateTime>,
    /// Object size in bytes.
    pub content_length: Option<u64>,
}

/// One entry in a listing page: a stored object or a virtual folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    /// A stored object.
    Blob(BlobItem),
    /// A virtual-folder prefix produced by delimiter grouping.
    Prefix(String),
}

/// One page of a hierarchical listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// Entries in server order.
    pub entries: Vec<ListEntry>,
    /// Cursor resuming after this page; `None` when no pages remain.
    pub continuation: Option<String>,
}

/// Lazy, forward-only pager over a container listing.
///
/// Each [`next_page`](Pager::next_page) call is one round trip. A fresh
/// enumeration can always be started from any previously observed page
/// cursor via [`ListOptions::continuation`]; concurrent mutation of the
/// container during a multi-page pull may yield duplicates or omissions.
pub struct Pager {
    client: BlobClient,
    container: String,
    prefix: Option<String>,
    delimiter: Option<String>,
    page_size_hint: usize,
    marker: Option<String>,
    finished: bool,
    cancel: CancellationToken,
}

impl Pager {
    pub(crate) fn new(
        client: BlobClient,
        container: String,
        options: ListOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            container,
            prefix: options.prefix,
            delimiter: options.delimiter,
            page_size_hint: options.page_size_hint,
            marker: options.continuation,
            finished: false,
            cancel,
        }
    }

    /// Pull the next page, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<ListingPage>> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .client
            .fetch_page(
                &self.container,
                self.prefix.as_deref(),
                self.delimiter.as_deref(),
                self.marker.as_deref(),
                self.page_size_hint,
                &self.cancel,
            )
            .await?;

        self.marker = page.continuation.clone();
        if self.marker.is_none() {
            self.finished = true;
        }
        Ok(Some(page))
    }

    /// Adapt the pager into a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<ListingPage>> {
        futures::stream::try_unfold(self, |mut pager| async move {
            Ok(pager.next_page().await?.map(|page| (page, pager)))
        })
    }
}

/// Decode one List Blobs response body.
pub(crate) fn decode_page(body: &str) -> Result<ListingPage> {
    let results: EnumerationResults = quick_xml::de::from_str(body)
        .map_err(|e| Error::unexpected("decoding listing response failed").with_source(e))?;

    let entries = results
        .blobs
        .items
        .into_iter()
        .map(|item| match item {
            BlobsEntry::Blob(blob) => ListEntry::Blob(BlobItem {
                name: blob.name,
                etag: blob.properties.etag,
                last_modified: blob
                    .properties
                    .last_modified
                    .as_deref()
                    .and_then(|v| time::parse_rfc2822(v).ok()),
                content_length: blob.properties.content_length,
            }),
            BlobsEntry::BlobPrefix(prefix) => ListEntry::Prefix(prefix.name),
        })
        .collect();

    Ok(ListingPage {
        entries,
        continuation: results.next_marker.filter(|marker| !marker.is_empty()),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct EnumerationResults {
    blobs: Blobs,
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "$value", default)]
    items: Vec<BlobsEntry>,
}

#[derive(Debug, Deserialize)]
enum BlobsEntry {
    Blob(BlobXml),
    BlobPrefix(BlobPrefixXml),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct BlobXml {
    name: String,
    properties: PropertiesXml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct BlobPrefixXml {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PropertiesXml {
    #[serde(rename = "Etag")]
    etag: Option<String>,
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
    #[serde(rename = "Content-Length")]
    content_length: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_page_preserves_server_order() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://account.blob.core.windows.net/" ContainerName="container">
  <Prefix>a/</Prefix>
  <Delimiter>/</Delimiter>
  <Blobs>
    <Blob>
      <Name>a/x</Name>
      <Properties>
        <Last-Modified>Tue, 01 Mar 2022 08:12:34 GMT</Last-Modified>
        <Etag>0x8D97D3</Etag>
        <Content-Length>7</Content-Length>
      </Properties>
    </Blob>
    <BlobPrefix>
      <Name>a/y/</Name>
    </BlobPrefix>
    <Blob>
      <Name>a/z</Name>
      <Properties>
        <Etag>0x8D97D4</Etag>
        <Content-Length>0</Content-Length>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>cursor-1</NextMarker>
</EnumerationResults>"#;

        let page = decode_page(body).unwrap();
        assert_eq!(page.continuation, Some("cursor-1".to_string()));
        assert_eq!(page.entries.len(), 3);

        match &page.entries[0] {
            ListEntry::Blob(blob) => {
                assert_eq!(blob.name, "a/x");
                assert_eq!(blob.etag.as_deref(), Some("0x8D97D3"));
                assert_eq!(blob.content_length, Some(7));
                assert_eq!(
                    blob.last_modified,
                    Some(time::parse_rfc2822("Tue, 01 Mar 2022 08:12:34 GMT").unwrap())
                );
            }
            other => panic!("expected blob entry, got {other:?}"),
        }
        assert_eq!(page.entries[1], ListEntry::Prefix("a/y/".to_string()));
        match &page.entries[2] {
            ListEntry::Blob(blob) => assert_eq!(blob.name, "a/z"),
            other => panic!("expected blob entry, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_page_empty_marker_means_end() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults>
  <Blobs/>
  <NextMarker/>
</EnumerationResults>"#;

        let page = decode_page(body).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.continuation, None);
    }
}
