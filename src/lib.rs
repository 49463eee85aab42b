pub mod config;
pub mod data;
pub mod emit;
pub mod error;
pub mod filter;
pub mod geo;
pub mod marker;
pub mod normalize;
pub mod platform;
pub mod process;
pub mod scan;
pub mod sink;
pub mod source;
pub mod table;

pub use error::{Error, Result};
