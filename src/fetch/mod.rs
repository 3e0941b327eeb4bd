//! Page fetching against the search proxy or the upstream API.
//!
//! - [`client`] - the [`Fetcher`] seam and its `reqwest` implementation
//! - [`response`] - response body decoding and error normalization
//! - [`error`] - the [`FetchError`] taxonomy

mod client;
mod error;
mod response;

pub use client::{
    build_client, Endpoints, Fetcher, HttpFetcher, PageRequest, PageResult, MAX_RESULTS_LIMIT,
};
pub use error::FetchError;
