//! Image loading infrastructure.

pub mod http_source;

pub use http_source::{HttpImageSource, HttpSourceConfig};
