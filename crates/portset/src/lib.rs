pub mod config;
pub mod deps;
pub mod error;
pub mod executor;
pub mod make;
pub mod options;
pub mod pass;
pub mod pkglist;
pub mod port;
pub mod poudriere;
pub mod reconcile;
pub mod tools;

pub use error::{Error, ErrorKind, Result};
