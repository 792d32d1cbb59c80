//! Solrfeed Index - Streaming batch indexer for Solr
//!
//! Reads tab-delimited records from a stream, groups them into fixed-size
//! batches and publishes each batch to a Solr collection with a synchronous
//! commit.
//!
//! # Features
//!
//! - Bounded memory: one batch in flight (per worker)
//! - `name\tvalue\t...` record micro-format, see [`record`]
//! - Optional synthetic `id` field for datasets without a natural key
//! - Optional parallel publishing with a bounded queue
//!
//! # Example
//!
//! ```ignore
//! use solrfeed_index::{CollectionTarget, Config, SolrPublisher, run};
//!
//! let target = CollectionTarget::new("localhost", 8983, "questions");
//! let publisher = SolrPublisher::new(target, &Default::default())?;
//! let summary = run(std::io::stdin().lock(), &publisher, Config::default(), None)?;
//! println!("Indexed {} documents", summary.documents);
//! ```

pub mod batch;
pub mod config;
pub mod pipeline;
pub mod publish;
pub mod record;

// Re-exports
pub use batch::{Batches, DEFAULT_CHUNK_SIZE, RawLines, batches};
pub use config::Config;
pub use pipeline::{Pipeline, PipelineError, Stage, Summary, run, with_sequence_id};
pub use publish::{CollectionTarget, Publish, PublishError, SolrPublisher};
pub use record::{Document, ParseError, RawLine, parse_line};
