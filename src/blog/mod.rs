//! The blog site the ORM was written for: its models and the account and
//! blog operations the HTTP handlers call.

pub mod accounts;
pub mod blogs;
pub mod error;
pub mod models;
pub mod page;

pub use error::{ApiError, ApiResult};
pub use models::{next_id, now, Blog, Comment, User};
pub use page::Page;
