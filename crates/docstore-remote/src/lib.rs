//! Remote repository adapters.
//!
//! - `HttpRepository`: networked backends behind one authenticated RPC per operation
//! - `EmbeddedRepository`: SQLite store standing in for the decentralized backend
//! - `RepositoryRegistry`: backend -> adapter dispatch

mod embedded;
mod http;
mod registry;

pub use embedded::EmbeddedRepository;
pub use http::HttpRepository;
pub use registry::RepositoryRegistry;
