pub mod chunk;
pub mod config;
pub mod error;
pub mod fallback;
pub mod retrieval;

pub use chunk::*;
pub use config::Config;
pub use error::*;
pub use retrieval::*;
