pub mod cli;
pub mod compare;
pub mod digest;
pub mod error;
pub mod generate;
mod logger;
pub mod merkle;
pub mod serialize;

pub use error::{Error, Result};
pub use merkle::Merkle;

pub use logger::init_logger;
