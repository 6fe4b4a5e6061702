//! A small async ORM: models declared with `#[model]` are registered once,
//! get precomputed CRUD statements and run them through a pooled `sqlx`
//! connection.

// Lets `#[model]` expansions inside this crate use `::awesome_orm` paths.
extern crate self as awesome_orm;

pub mod blog;
pub mod libs;

pub use awesome_orm_derive::model;
pub use libs::*;
pub use serde_json;
