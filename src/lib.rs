//! Keyword search over a video platform with client-side title filtering.
//!
//! Pages are fetched one at a time through a [`fetch::Fetcher`], each page's
//! titles are filtered by a [`search::FilterMode`], and matches stream out of a
//! [`search::SearchSession`] as [`search::SessionEvent`]s until the results run
//! out, the user stops, or a fetch fails.

pub mod config;
pub mod fetch;
pub mod search;
pub mod storage;
pub mod util;
