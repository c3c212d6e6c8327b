//! Database entities.

#![allow(missing_docs)]

pub mod event;
pub mod event_guest;
pub mod event_organizer;
pub mod point_transaction;
pub mod promotion;
pub mod transaction_promotion;
pub mod user;
pub mod user_promotion;

pub use event::Entity as Event;
pub use event_guest::Entity as EventGuest;
pub use event_organizer::Entity as EventOrganizer;
pub use point_transaction::Entity as PointTransaction;
pub use promotion::Entity as Promotion;
pub use transaction_promotion::Entity as TransactionPromotion;
pub use user::Entity as User;
pub use user_promotion::Entity as UserPromotion;
