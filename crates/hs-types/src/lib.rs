pub mod config;
pub mod errors;
pub mod literal;
pub mod path;

pub use config::*;
pub use errors::*;
pub use literal::*;
pub use path::*;
