use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

// Headers used by the blob service.
pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_VERSION: &str = "x-ms-version";
pub const X_MS_BLOB_TYPE: &str = "x-ms-blob-type";
pub const X_MS_REQUEST_ID: &str = "x-ms-request-id";
pub const CONTENT_MD5: &str = "content-md5";

/// Service version sent with every data-plane request.
pub const AZURE_VERSION: &str = "2019-12-12";

/// Characters the blob service expects to stay unencoded in query strings
/// and blob paths.
pub static AZURE_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'/')
    .remove(b'~');
