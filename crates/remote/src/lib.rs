//! HTTP client for the ledgerline remote store.
//!
//! [`RemoteApiClient`] implements the core `RemoteStore` contract over the
//! `/api/{collection}` REST endpoints and maps transport and API failures onto
//! the core error taxonomy.

mod auth;
mod client;
mod error;
mod types;

pub use auth::{SessionProvider, StaticSession};
pub use client::{api_base_url, collection_path, RemoteApiClient, API_URL_ENV};
pub use error::{ApiRetryClass, RemoteApiError};
pub use types::ApiEnvelope;
