pub mod config;
pub mod error;
pub mod record;
pub mod value;

pub use config::Config;
pub use error::*;
pub use record::*;
pub use value::*;
