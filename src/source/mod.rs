//! Remote services that produce an image for a catalog entry.
//!
//! Search services hand back a URL that still has to be downloaded, generation
//! services put the image bytes in the response. Both go through [`ArtifactSource`].

use std::future::Future;

use crate::catalog::CatalogEntry;
use crate::error::FetchError;
use crate::retry::RetryPolicy;

pub mod generate;
pub mod search;

pub use generate::{GenerateConfig, GenerateSource, ReferenceImage};
pub use search::{SearchConfig, SearchSource};

/// Where the image for an entry lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Artifact {
    /// Needs a second request to fetch
    Url(String),
    /// Already in hand
    Inline {
        /// Decoded image bytes
        bytes: Vec<u8>,
        /// MIME type reported by the remote, if any
        mime_type: Option<String>,
    },
}

/// Result of asking a source about one entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fetched {
    /// The remote produced something usable
    Found(Artifact),
    /// The remote answered fine but had nothing for this entry
    NotFound(String),
}

/// A remote capable of finding or making an image for a catalog entry.
pub trait ArtifactSource {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Asks the remote for the entry's image, retrying per `policy`.
    ///
    /// An `Err` means every attempt failed; the caller records it against the
    /// entry and moves on.
    fn fetch_artifact(
        &self,
        entry: &CatalogEntry,
        policy: &RetryPolicy,
    ) -> impl Future<Output = Result<Fetched, FetchError>>;
}
