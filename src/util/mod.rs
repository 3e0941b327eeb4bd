//! Terminal text helpers: Unicode-aware width, truncation and control
//! character stripping for printing untrusted titles.
//!
//! ```
//! use tubescan::util::{strip_control_chars, truncate_to_width};
//!
//! assert_eq!(strip_control_chars("\x1b[1mBold\x1b[0m"), "Bold");
//! assert_eq!(truncate_to_width("Long video title", 10), "Long vi...");
//! ```

mod text;

pub use text::{display_title, strip_control_chars, truncate_to_width};
