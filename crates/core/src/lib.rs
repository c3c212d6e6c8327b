//! Points ledger, promotion evaluation and event budgets.
//!
//! The building blocks (`ledger`, `evaluator`, `budget`, `policy`) operate on
//! a caller-supplied connection so that services can compose them inside one
//! database transaction.

pub mod budget;
pub mod evaluator;
pub mod ledger;
pub mod policy;
pub mod services;

pub use services::*;
