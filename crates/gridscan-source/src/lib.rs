//! gridscan-source — paginated explorer collection sources.
//!
//! [`CollectionSource`] is the seam between the scheduler and the remote
//! explorer. Two implementations are provided:
//!
//! - [`HttpSource`]: plain HTTP/1.1 client for the explorer directory API
//!   (`/nodes`, `/farms`, `/gateways`, page count in the `Pages` header).
//! - [`MemorySource`]: fixed in-memory collections with scriptable
//!   failures and delays.

pub mod client;
pub mod error;
pub mod memory;
pub mod source;

pub use client::HttpSource;
pub use error::{SourceError, SourceResult};
pub use memory::MemorySource;
pub use source::{CollectionSource, Page};
