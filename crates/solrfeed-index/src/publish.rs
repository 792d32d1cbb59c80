//! Batch publishing to a Solr collection through its JSON update handler.
//!
//! Each call is one `POST .../update/json?commit=true`; when it returns Ok the
//! batch is committed and searchable. There is no retry: a failed call may
//! still have been partially applied server-side, so a re-run can duplicate
//! documents unless the collection has a unique key (see
//! [`with_sequence_id`](crate::pipeline::with_sequence_id)).

use solrfeed_core::{HttpConfig, HttpError};

use crate::record::Document;

/// Destination index: host, port, collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub host: String,
    pub port: u16,
    pub collection: String,
}

impl CollectionTarget {
    pub fn new(host: impl Into<String>, port: u16, collection: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            collection: collection.into(),
        }
    }

    /// JSON update endpoint with synchronous commit
    pub fn update_url(&self) -> String {
        format!(
            "http://{}:{}/solr/{}/update/json?commit=true",
            self.host, self.port, self.collection
        )
    }
}

impl std::fmt::Display for CollectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.collection)
    }
}

/// Error from publishing one batch
#[derive(Debug)]
pub enum PublishError {
    /// Batch could not be serialized
    Encode(serde_json::Error),
    /// Request never got a response
    Transport(String),
    /// Index rejected the batch
    Index { status: u16, body: String },
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "cannot encode batch: {e}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Index { status, body } if body.is_empty() => {
                write!(f, "index rejected batch with HTTP {status}")
            }
            Self::Index { status, body } => {
                write!(f, "index rejected batch with HTTP {status}: {body}")
            }
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HttpError> for PublishError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status { status, body } => Self::Index { status, body },
            HttpError::Transport { message } | HttpError::Client { message } => {
                Self::Transport(message)
            }
        }
    }
}

/// Sink for batches of documents.
///
/// Implementations must be callable from several publisher threads at once.
pub trait Publish: Send + Sync {
    /// Publish one batch; returns once the batch is durably visible or failed.
    fn publish(&self, batch: &[Document]) -> Result<(), PublishError>;
}

/// [`Publish`] implementation backed by Solr's `/update/json` handler.
pub struct SolrPublisher {
    target: CollectionTarget,
    url: String,
    client: reqwest::Client,
}

impl SolrPublisher {
    pub fn new(target: CollectionTarget, http: &HttpConfig) -> Result<Self, PublishError> {
        let client = solrfeed_core::build_client(http)?;
        let url = target.update_url();
        Ok(Self {
            target,
            url,
            client,
        })
    }

    pub fn target(&self) -> &CollectionTarget {
        &self.target
    }
}

impl Publish for SolrPublisher {
    fn publish(&self, batch: &[Document]) -> Result<(), PublishError> {
        let body = serde_json::to_vec(batch).map_err(PublishError::Encode)?;
        log::debug!(
            "POST {} ({} docs, {} bytes)",
            self.url,
            batch.len(),
            body.len()
        );
        solrfeed_core::post_json(&self.client, &self.url, body)?;
        Ok(())
    }
}
