//! Paginated search with client-side title filtering.
//!
//! - [`types`] - queries, date bounds, filter modes and result pages
//! - [`policy`] - the pure title matcher
//! - [`session`] - the fetch loop and its state machine
//!
//! # Example
//!
//! ```ignore
//! use tubescan::search::{FilterMode, SearchRequest, SearchSession};
//!
//! let mut session = SearchSession::new(fetcher);
//! let stop = session.stop_handle();
//! let status = session
//!     .start(SearchRequest::new("red fox", FilterMode::Default))
//!     .await?;
//! println!("{}", status.message);
//! ```

mod policy;
mod session;
mod types;

pub use policy::{filter_items, matches};
pub use session::{
    SearchRequest, SearchSession, SessionEvent, SessionState, SessionStatus, StopHandle,
    DEFAULT_PAGE_DELAY,
};
pub use types::{DateRange, FilterMode, Item, Page, Query, SessionError};
