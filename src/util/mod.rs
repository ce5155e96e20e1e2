//! Text helpers shared by the feed and sanitizer modules.
//!
//! ```
//! use feedstock::util::{strip_control_chars, truncate_chars};
//!
//! assert_eq!(strip_control_chars("\x1b[31mred\x1b[0m"), "red");
//! assert_eq!(truncate_chars("hello world", 5), "hello");
//! ```

mod text;

pub use text::{strip_control_chars, truncate_chars};
