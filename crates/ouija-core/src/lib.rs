//! Data model, seed encoding, and filter-config surface shared by the search engine.
//!
//! This crate owns everything that can be reasoned about without an OpenCL device:
//! the base-35 seed encoding, the `FilterConfig`/`Desire` data model, the 46-byte
//! `ResultRecord` wire layout shared with the (out-of-scope) compute kernel, and the
//! dynamic cutoff state machine.

mod config;
mod cutoff;
mod error;
mod filter;
mod result_record;
mod seed;

pub use config::load_filter_config;
pub use cutoff::CutoffState;
pub use error::Error;
pub use filter::{Desire, FilterConfig};
pub use result_record::ResultRecord;
pub use seed::{Seed, SEED_ALPHABET, SEED_LEN, SEED_SPACE};

pub type Result<T> = std::result::Result<T, Error>;
