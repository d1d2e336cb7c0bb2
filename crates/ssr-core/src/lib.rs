pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod io;
pub mod job;
pub mod paths;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod source;
pub mod store;
pub mod symbols;

pub use error::{Result, SsrError};
