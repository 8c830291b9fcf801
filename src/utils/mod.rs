//! Utility functions shared by the CLI and the crawler.
//!
//! - [`app_data`] - Application data directory and config file (XDG-compliant)
//! - [`tokenizer`] - Positional word splitting for the reference feeder
//! - [`progress`] - Progress bars, no-op without the `progress` feature
//!
//! ```
//! use hashdex::utils::tokenize;
//!
//! let words = tokenize("The cat sat");
//! assert_eq!(words, vec!["the", "cat", "sat"]);
//! ```

pub mod app_data;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use tokenizer::*;
