pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod orm;
pub mod query_builder;
pub mod schema;

// Re-export them for easier access from the crate root
pub use config::*;
pub use error::*;
pub use executor::*;
pub use logging::*;
pub use model::*;
pub use orm::*;
pub use query_builder::*;
pub use schema::*;
