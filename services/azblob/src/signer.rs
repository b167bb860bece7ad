use std::fmt::Write;
use std::str::FromStr;

use blobway_core::hash::{base64_decode, base64_hmac_sha256};
use blobway_core::time::{self, format_http_date, DateTime};
use blobway_core::Result;
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::uri::PathAndQuery;
use http::Uri;
use log::debug;

use crate::constants::*;
use crate::Credential;

/// Signs data-plane requests with the connection's credential.
///
/// Shared-key credentials produce an `Authorization: SharedKey` header per
/// [Authorize with Shared Key]; SAS credentials append the pre-issued token
/// to the query string; anonymous connections go out unsigned.
///
/// [Authorize with Shared Key]: https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestSigner {
    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a signer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn sign(&self, parts: &mut Parts, cred: Option<&Credential>) -> Result<()> {
        parts
            .headers
            .insert(X_MS_VERSION, HeaderValue::from_static(AZURE_VERSION));

        let Some(cred) = cred else {
            // Anonymous access, e.g. a public container.
            return Ok(());
        };

        match cred {
            Credential::SasToken { token } => append_sas_token(parts, token),
            Credential::SharedKey {
                account_name,
                account_key,
            } => {
                let now = self.time.unwrap_or_else(time::now);
                parts
                    .headers
                    .insert(X_MS_DATE, format_http_date(now).parse()?);

                let string_to_sign = string_to_sign(parts, account_name)?;
                let decode_content = base64_decode(account_key)?;
                let signature = base64_hmac_sha256(&decode_content, string_to_sign.as_bytes());

                parts.headers.insert(header::AUTHORIZATION, {
                    let mut value: HeaderValue =
                        format!("SharedKey {account_name}:{signature}").parse()?;
                    value.set_sensitive(true);
                    value
                });
                Ok(())
            }
        }
    }
}

fn append_sas_token(parts: &mut Parts, token: &str) -> Result<()> {
    let pq = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let sep = if pq.contains('?') { '&' } else { '?' };

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.path_and_query = Some(PathAndQuery::from_str(&format!("{pq}{sep}{token}"))?);
    parts.uri = Uri::from_parts(uri_parts)?;
    Ok(())
}

/// Construct string to sign
///
/// ## Format
///
/// ```text
/// VERB + "\n" +
/// Content-Encoding + "\n" +
/// Content-Language + "\n" +
/// Content-Length + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// If-Modified-Since + "\n" +
/// If-Match + "\n" +
/// If-None-Match + "\n" +
/// If-Unmodified-Since + "\n" +
/// Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource;
/// ```
fn string_to_sign(parts: &Parts, account_name: &str) -> Result<String> {
    let mut s = String::with_capacity(128);

    writeln!(&mut s, "{}", parts.method.as_str())?;
    writeln!(&mut s, "{}", header_or_default(parts, "content-encoding")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "content-language")?)?;
    writeln!(&mut s, "{}", {
        let v = header_or_default(parts, "content-length")?;
        if v == "0" {
            ""
        } else {
            v
        }
    })?;
    writeln!(&mut s, "{}", header_or_default(parts, CONTENT_MD5)?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "content-type")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "date")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "if-modified-since")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "if-match")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "if-none-match")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "if-unmodified-since")?)?;
    writeln!(&mut s, "{}", header_or_default(parts, "range")?)?;
    writeln!(&mut s, "{}", canonicalize_header(parts))?;
    write!(&mut s, "{}", canonicalize_resource(parts, account_name))?;

    debug!("string to sign: {}", &s);

    Ok(s)
}

fn header_or_default<'a>(parts: &'a Parts, name: &str) -> Result<&'a str> {
    match parts.headers.get(name) {
        Some(v) => Ok(v.to_str()?),
        None => Ok(""),
    }
}

/// ## Reference
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalize_header(parts: &Parts) -> String {
    let mut headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter(|(k, _)| k.as_str().starts_with("x-ms-"))
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    headers.sort();

    headers
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// ## Reference
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
fn canonicalize_resource(parts: &Parts, account_name: &str) -> String {
    let path = parts.uri.path();

    let Some(query) = parts.uri.query() else {
        return format!("/{account_name}{path}");
    };

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = pairs
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("/{account_name}{path}\n{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn test_parts(uri: &str) -> Parts {
        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        req.into_parts().0
    }

    fn test_time() -> DateTime {
        time::parse_rfc3339("2022-03-01T08:12:34Z").unwrap()
    }

    #[test]
    fn test_shared_key_signing_is_deterministic() {
        let cred = Credential::with_shared_key(
            "account",
            &blobway_core::hash::base64_encode(b"account_key"),
        );
        let signer = RequestSigner::new().with_time(test_time());

        let mut a = test_parts("https://account.blob.core.windows.net/container/blob");
        let mut b = test_parts("https://account.blob.core.windows.net/container/blob");
        signer.sign(&mut a, Some(&cred)).unwrap();
        signer.sign(&mut b, Some(&cred)).unwrap();

        let auth = a.headers.get(header::AUTHORIZATION).unwrap();
        assert_eq!(auth, b.headers.get(header::AUTHORIZATION).unwrap());
        assert!(auth.to_str().unwrap().starts_with("SharedKey account:"));
        assert_eq!(
            a.headers.get(X_MS_DATE).unwrap(),
            "Tue, 01 Mar 2022 08:12:34 GMT"
        );
        assert_eq!(a.headers.get(X_MS_VERSION).unwrap(), AZURE_VERSION);
    }

    #[test]
    fn test_query_changes_signature() {
        let cred = Credential::with_shared_key(
            "account",
            &blobway_core::hash::base64_encode(b"account_key"),
        );
        let signer = RequestSigner::new().with_time(test_time());

        let mut plain = test_parts("https://account.blob.core.windows.net/container");
        let mut listing =
            test_parts("https://account.blob.core.windows.net/container?restype=container&comp=list");
        signer.sign(&mut plain, Some(&cred)).unwrap();
        signer.sign(&mut listing, Some(&cred)).unwrap();

        assert_ne!(
            plain.headers.get(header::AUTHORIZATION).unwrap(),
            listing.headers.get(header::AUTHORIZATION).unwrap()
        );
    }

    #[test]
    fn test_sas_token_is_appended_to_query() {
        let cred = Credential::with_sas_token("sv=2018-11-09&sr=c&sp=rl&sig=abc");
        let signer = RequestSigner::new();

        let mut parts = test_parts("https://account.blob.core.windows.net/container/blob");
        signer.sign(&mut parts, Some(&cred)).unwrap();

        assert_eq!(
            parts.uri.to_string(),
            "https://account.blob.core.windows.net/container/blob?sv=2018-11-09&sr=c&sp=rl&sig=abc"
        );
        assert!(parts.headers.get(header::AUTHORIZATION).is_none());

        // A token appends after existing query parameters.
        let mut parts = test_parts("https://account.blob.core.windows.net/c?restype=container");
        signer.sign(&mut parts, Some(&cred)).unwrap();
        assert_eq!(
            parts.uri.query().unwrap(),
            "restype=container&sv=2018-11-09&sr=c&sp=rl&sig=abc"
        );
    }

    #[test]
    fn test_anonymous_requests_stay_unsigned() {
        let signer = RequestSigner::new();
        let mut parts = test_parts("https://account.blob.core.windows.net/container/blob");
        signer.sign(&mut parts, None).unwrap();

        assert!(parts.headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(parts.headers.get(X_MS_VERSION).unwrap(), AZURE_VERSION);
    }
}
