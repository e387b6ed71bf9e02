pub mod config;
pub mod error;
pub mod timefmt;

pub use config::*;
pub use error::*;
pub use timefmt::*;
