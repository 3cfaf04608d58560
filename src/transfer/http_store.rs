//! Object store backed by the platform's HTTP storage gateway
//!
//! Gateway protocol:
//!
//! | Request | Meaning |
//! |---------|---------|
//! | `GET {endpoint}/{bucket}?prefix=P` | JSON listing `{"objects": [{"key", "size", "sha256"?}]}` |
//! | `GET {endpoint}/{bucket}/{key}` | object body |
//! | `PUT {endpoint}/{bucket}/{key}` | upload object body |

use super::store::{ObjectInfo, ObjectStore, RemoteLocation, StoreError};
use crate::credentials::CredentialProvider;
use crate::error::{LayerError, LayerResult};
use serde::Deserialize;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use ureq::{Agent, RequestBuilder, SendBody};
use url::Url;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const RESPONSE_TIMEOUT_SECS: u64 = 60;
const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    objects: Vec<ObjectInfo>,
}

/// HTTP storage gateway client
pub struct HttpStore {
    endpoint: Url,
    agent: Agent,
    credentials: Arc<dyn CredentialProvider>,
    request_timeout: Option<Duration>,
}

fn build_agent(timeout: Option<Duration>) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(timeout)
        .timeout_connect(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
        .timeout_recv_response(Some(Duration::from_secs(RESPONSE_TIMEOUT_SECS)))
        .http_status_as_error(false)
        .build();
    Agent::new_with_config(config)
}

impl HttpStore {
    /// Create a client for `endpoint` (`http://` or `https://`)
    pub fn new(endpoint: &str, credentials: Arc<dyn CredentialProvider>) -> LayerResult<Self> {
        let invalid = |reason: String| LayerError::InvalidLocation {
            location: endpoint.to_string(),
            reason,
        };

        let endpoint = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(invalid("storage endpoint must be http or https".to_string()));
        }
        if endpoint.cannot_be_a_base() {
            return Err(invalid("storage endpoint cannot be a base URL".to_string()));
        }

        Ok(Self {
            endpoint,
            agent: build_agent(None),
            credentials,
            request_timeout: None,
        })
    }

    /// Cap every request, body included, at `timeout`
    ///
    /// A stalled connection then cannot hold a transfer call past its own
    /// deadline by more than one request.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.agent = build_agent(timeout);
        self.request_timeout = timeout;
        self
    }

    fn bucket_url(&self, bucket: &str) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Request(format!("bad endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .push(bucket);
        Ok(url)
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        if key.is_empty() || key.split('/').any(|s| s.is_empty() || s == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let mut url = self.bucket_url(bucket)?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Request(format!("bad endpoint {}", self.endpoint)))?
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorize<B>(&self, request: RequestBuilder<B>) -> Result<RequestBuilder<B>, StoreError> {
        let credentials = self
            .credentials
            .credentials()
            .map_err(|e| StoreError::Auth(e.to_string()))?;
        Ok(match credentials {
            Some(creds) => request.header("Authorization", format!("Bearer {}", creds.token)),
            None => request,
        })
    }
}

impl HttpStore {
    fn map_ureq_error(&self, err: ureq::Error, url: &Url) -> StoreError {
        match err {
            ureq::Error::StatusCode(status) => StoreError::Status {
                status,
                url: url.to_string(),
            },
            ureq::Error::Io(e) => StoreError::Network(format!("{url}: {e}")),
            e @ ureq::Error::Timeout(_) => match self.request_timeout {
                Some(limit) => StoreError::Network(format!("{url}: {e} (limit {limit:?})")),
                None => StoreError::Network(format!("{url}: {e}")),
            },
            e @ (ureq::Error::HostNotFound | ureq::Error::ConnectionFailed) => {
                StoreError::Network(format!("{url}: {e}"))
            }
            other => StoreError::Request(format!("{url}: {other}")),
        }
    }
}

fn check_status(status: u16, url: &Url, key: &str) -> Result<(), StoreError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StoreError::NotFound(key.to_string())),
        401 | 403 => Err(StoreError::Auth(format!("HTTP {status} from {url}"))),
        _ => Err(StoreError::Status {
            status,
            url: url.to_string(),
        }),
    }
}

impl ObjectStore for HttpStore {
    fn list(&self, location: &RemoteLocation) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut url = self.bucket_url(location.bucket())?;
        url.query_pairs_mut().append_pair("prefix", location.prefix());

        let request = self.authorize(self.agent.get(url.as_str()))?;
        let mut response = request.call().map_err(|e| self.map_ureq_error(e, &url))?;
        check_status(response.status().as_u16(), &url, location.prefix())?;

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| self.map_ureq_error(e, &url))?;
        let listing: ListResponse = serde_json::from_str(&body).map_err(|e| {
            StoreError::io(
                format!("parsing listing from {url}"),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        debug!("Listed {} objects under {}", listing.objects.len(), location);
        Ok(listing.objects)
    }

    fn get(
        &self,
        location: &RemoteLocation,
        key: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, StoreError> {
        let url = self.object_url(location.bucket(), key)?;
        let request = self.authorize(self.agent.get(url.as_str()))?;
        let mut response = request.call().map_err(|e| self.map_ureq_error(e, &url))?;
        check_status(response.status().as_u16(), &url, key)?;

        let mut reader = response.body_mut().as_reader();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        loop {
            // Body read failures are network faults, sink failures are local
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StoreError::Network(format!("reading {url}: {e}"))),
            };
            sink.write_all(&buffer[..n])
                .map_err(|e| StoreError::io(format!("writing {key}"), e))?;
            written += n as u64;
        }
        Ok(written)
    }

    fn put(
        &self,
        location: &RemoteLocation,
        key: &str,
        source: &mut dyn Read,
        size: u64,
    ) -> Result<(), StoreError> {
        let url = self.object_url(location.bucket(), key)?;
        let request = self
            .authorize(self.agent.put(url.as_str()))?
            .header("Content-Length", size.to_string())
            .header("Content-Type", "application/octet-stream");

        let response = request
            .send(SendBody::from_reader(source))
            .map_err(|e| self.map_ureq_error(e, &url))?;
        check_status(response.status().as_u16(), &url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AnonymousCredentials;

    fn store(endpoint: &str) -> HttpStore {
        HttpStore::new(endpoint, Arc::new(AnonymousCredentials)).unwrap()
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(HttpStore::new("ftp://host", Arc::new(AnonymousCredentials)).is_err());
        assert!(HttpStore::new("not a url", Arc::new(AnonymousCredentials)).is_err());
    }

    #[test]
    fn request_timeout_follows_call_timeout() {
        assert_eq!(store("https://storage.example").request_timeout, None);
        let capped = store("https://storage.example")
            .with_request_timeout(Some(Duration::from_secs(5)));
        assert_eq!(capped.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn object_url_encodes_segments() {
        let store = store("https://storage.example/v1/");
        let url = store.object_url("models", "train/a b/model.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.example/v1/models/train/a%20b/model.json"
        );
    }

    #[test]
    fn object_url_rejects_traversal() {
        let store = store("https://storage.example");
        assert!(matches!(
            store.object_url("models", "a/../b"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn status_mapping() {
        let url = Url::parse("https://storage.example/x").unwrap();
        assert!(check_status(204, &url, "k").is_ok());
        assert!(matches!(check_status(404, &url, "k"), Err(StoreError::NotFound(_))));
        assert!(matches!(check_status(403, &url, "k"), Err(StoreError::Auth(_))));
        assert!(check_status(503, &url, "k").unwrap_err().is_retryable());
    }
}
