//! Common utilities and shared types for the campus points platform.
//!
//! This crate provides foundational components used across all crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Pagination**: Page/limit requests and paged results via [`Pagination`] and [`Page`]
//! - **Tokens**: Reset-token generation via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use points_common::{AppResult, Config, Pagination};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let page = Pagination::new(Some(2), None)?;
//!     println!("{} rows skipped on {}", page.offset(), config.database.url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod pagination;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use pagination::{Page, Pagination};
