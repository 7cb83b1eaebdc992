//! Reports printed after a conversion, e.g. for `--list`.
pub mod list;
pub mod tables;

pub use list::*;
