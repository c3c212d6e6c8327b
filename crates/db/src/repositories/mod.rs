//! Read-side repositories.
//!
//! Writes that move points or seats go through transactional helpers in the
//! core crate; these repositories serve lookups and paged listings.

mod event;
mod promotion;
mod transaction;
mod user;

pub use event::{EventFilter, EventRepository};
pub use promotion::{PromotionFilter, PromotionRepository};
pub use transaction::{AmountFilter, TransactionFilter, TransactionRepository};
pub use user::{UserFilter, UserRepository};
