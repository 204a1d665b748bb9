pub mod error;
pub mod utils;
pub mod config;
pub mod logging;
pub mod opus;

#[cfg(test)]
pub(crate) mod test_utils;

pub use opus::{read_opus, read_opus_with_options, DecodedFile};
