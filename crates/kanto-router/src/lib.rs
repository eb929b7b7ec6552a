//! Path templates for Kanto.
//!
//! This crate turns route templates such as `/cards/:id` into anchored
//! matchers and extracts named parameters from request paths.
//!
//! # Features
//!
//! - **Named Segments**: `:name` placeholders, also inside a segment (`/files/:name.json`)
//! - **Literal Escaping**: regex metacharacters in templates are matched literally
//! - **Trailing Slash**: every compiled pattern accepts one optional trailing `/`
//! - **Decoded Values**: parameter values are percent-decoded
//!
//! # Example
//!
//! ```rust
//! use kanto_router::PathPattern;
//!
//! let pattern = PathPattern::compile("/sets/:set/cards/:id").unwrap();
//!
//! let params = pattern.matches("/sets/base1/cards/4").unwrap();
//! assert_eq!(params.get("set"), Some("base1"));
//! assert_eq!(params.get("id"), Some("4"));
//!
//! assert!(pattern.matches("/sets/base1").is_none());
//! ```
//!
//! Paths are normalised before they are compiled:
//!
//! ```rust
//! use kanto_router::normalize_path;
//!
//! assert_eq!(normalize_path("//api///cards/"), "/api/cards");
//! assert_eq!(normalize_path(""), "/");
//! ```

#![doc(html_root_url = "https://docs.rs/kanto-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod path;
mod pattern;

pub use error::PatternError;
pub use params::Params;
pub use path::normalize_path;
pub use pattern::PathPattern;
