//! End-to-end ledger scenarios against an in-memory SQLite database.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use points_common::{AppError, Pagination};
use points_core::{
    AdjustmentInput, AwardInput, CreateEventInput, EventService, PromotionQuery,
    PromotionService, PurchaseInput, RedemptionInput, TransactionService, TransferInput,
    UpdateEventInput, UpdatePromotionInput, UserService,
};
use points_common::config::RegistrationConfig;
use points_db::entities::point_transaction::TransactionKind;
use points_db::entities::promotion::PromotionKind;
use points_db::entities::user::{self, UserRole};
use points_db::entities::{Event, PointTransaction, User, event};
use points_db::test_utils::{
    TestDatabase, seed_active_promotion, seed_running_event, seed_user,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set};

struct Harness {
    db: TestDatabase,
    conn: Arc<DatabaseConnection>,
}

impl Harness {
    async fn new() -> Self {
        let db = TestDatabase::sqlite().await.unwrap();
        let conn = Arc::clone(&db.conn);
        Self { db, conn }
    }

    fn transactions(&self) -> TransactionService {
        TransactionService::new(Arc::clone(&self.conn))
    }

    fn events(&self) -> EventService {
        EventService::new(Arc::clone(&self.conn))
    }

    fn promotions(&self) -> PromotionService {
        PromotionService::new(Arc::clone(&self.conn))
    }

    fn users(&self) -> UserService {
        UserService::new(Arc::clone(&self.conn), &RegistrationConfig::default())
    }

    async fn user(&self, utorid: &str, role: UserRole, points: i32) -> user::Model {
        seed_user(self.db.connection(), utorid, role, points)
            .await
            .unwrap()
    }

    async fn points(&self, user_id: i32) -> i32 {
        User::find_by_id(user_id)
            .one(self.db.connection())
            .await
            .unwrap()
            .unwrap()
            .points
    }

    async fn event(&self, event_id: i32) -> event::Model {
        Event::find_by_id(event_id)
            .one(self.db.connection())
            .await
            .unwrap()
            .unwrap()
    }

    async fn no_negative_balances(&self) {
        let users = User::find().all(self.db.connection()).await.unwrap();
        assert!(users.iter().all(|u| u.points >= 0));
    }
}

fn purchase(utorid: &str, spent: f64, promotion_ids: Vec<i32>) -> PurchaseInput {
    PurchaseInput {
        utorid: utorid.to_string(),
        spent,
        promotion_ids,
        remark: None,
    }
}

// ==================== Purchases ====================

#[tokio::test]
async fn test_purchase_rounds_base_points() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;

    let created = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 19.99, vec![]))
        .await
        .unwrap();

    assert_eq!(created.transaction.kind, TransactionKind::Purchase);
    assert_eq!(created.transaction.points, 80);
    assert_eq!(created.transaction.created_by, "cashier1");
    assert_eq!(h.points(customer.id).await, 80);
}

#[tokio::test]
async fn test_purchase_combines_one_time_and_automatic_promotions() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;
    let one_time = seed_active_promotion(
        h.db.connection(),
        PromotionKind::OneTime,
        None,
        Some(50),
        None,
    )
    .await
    .unwrap();
    seed_active_promotion(h.db.connection(), PromotionKind::Automatic, Some(0.02), None, None)
        .await
        .unwrap();

    let created = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 100.0, vec![one_time.id]))
        .await
        .unwrap();

    assert_eq!(created.transaction.points, 452);
    assert_eq!(created.promotion_ids, vec![one_time.id]);
    assert_eq!(h.points(customer.id).await, 452);

    let err = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 100.0, vec![one_time.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert_eq!(h.points(customer.id).await, 452);
}

#[tokio::test]
async fn test_used_promotion_drops_out_of_customer_listing() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;
    let one_time = seed_active_promotion(
        h.db.connection(),
        PromotionKind::OneTime,
        None,
        Some(10),
        None,
    )
    .await
    .unwrap();

    let before = h
        .promotions()
        .list(customer.id, PromotionQuery::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(before.count, 1);

    h.transactions()
        .create_purchase(cashier.id, purchase("student1", 5.0, vec![one_time.id]))
        .await
        .unwrap();

    let after = h
        .promotions()
        .list(customer.id, PromotionQuery::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(after.count, 0);
}

#[tokio::test]
async fn test_bad_promotion_rejects_whole_purchase() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;
    let needs_fifty = seed_active_promotion(
        h.db.connection(),
        PromotionKind::OneTime,
        None,
        Some(20),
        Some(50.0),
    )
    .await
    .unwrap();

    let err = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 10.0, vec![needs_fifty.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    let err = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 10.0, vec![9999]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    assert_eq!(h.points(customer.id).await, 0);
    assert_eq!(PointTransaction::find().count(h.db.connection()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_regular_user_cannot_ring_up_purchase() {
    let h = Harness::new().await;
    let student = h.user("student1", UserRole::Regular, 0).await;
    h.user("student2", UserRole::Regular, 0).await;

    let err = h
        .transactions()
        .create_purchase(student.id, purchase("student2", 10.0, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

// ==================== Review ====================

#[tokio::test]
async fn test_flagging_purchase_reverses_and_restores_points() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;

    let created = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 20.0, vec![]))
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 80);

    let flagged = h
        .transactions()
        .set_suspicious(manager.id, created.transaction.id, true)
        .await
        .unwrap();
    assert!(flagged.transaction.suspicious);
    assert_eq!(h.points(customer.id).await, 0);

    // Same value again changes nothing.
    h.transactions()
        .set_suspicious(manager.id, created.transaction.id, true)
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 0);

    let cleared = h
        .transactions()
        .set_suspicious(manager.id, created.transaction.id, false)
        .await
        .unwrap();
    assert!(!cleared.transaction.suspicious);
    assert_eq!(h.points(customer.id).await, 80);
}

#[tokio::test]
async fn test_suspicious_cashier_purchase_is_held() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;

    let mut flagged: user::ActiveModel = cashier.clone().into();
    flagged.suspicious = Set(true);
    flagged.update(h.db.connection()).await.unwrap();

    let created = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 19.99, vec![]))
        .await
        .unwrap();
    assert!(created.transaction.suspicious);
    assert_eq!(created.transaction.points, 80);
    assert_eq!(h.points(customer.id).await, 0);

    h.transactions()
        .set_suspicious(manager.id, created.transaction.id, false)
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 80);
}

#[tokio::test]
async fn test_transfers_cannot_be_flagged() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let sender = h.user("student1", UserRole::Regular, 50).await;
    h.user("student2", UserRole::Regular, 0).await;

    let transfer = h
        .transactions()
        .create_transfer(
            sender.id,
            TransferInput {
                utorid: "student2".to_string(),
                amount: 10,
                remark: None,
            },
        )
        .await
        .unwrap();

    let err = h
        .transactions()
        .set_suspicious(manager.id, transfer.transaction.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_flagging_adjustment_reverses_it() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;

    let bought = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 19.99, vec![]))
        .await
        .unwrap();
    let adjusted = h
        .transactions()
        .create_adjustment(
            manager.id,
            AdjustmentInput {
                utorid: "student1".to_string(),
                amount: 20,
                related_id: bought.transaction.id,
                promotion_ids: vec![],
                remark: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 100);

    h.transactions()
        .set_suspicious(manager.id, adjusted.transaction.id, true)
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 80);

    h.transactions()
        .set_suspicious(manager.id, adjusted.transaction.id, false)
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 100);
}

#[tokio::test]
async fn test_flagging_event_award_reverses_it() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let guest = h.user("student1", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();
    h.events()
        .add_guest(manager.id, event.id, "student1")
        .await
        .unwrap();

    let awarded = h
        .transactions()
        .award_event_points(
            manager.id,
            event.id,
            AwardInput {
                utorid: Some("student1".to_string()),
                amount: 30,
                remark: None,
            },
        )
        .await
        .unwrap();
    let award_id = awarded[0].transaction.id;
    assert_eq!(h.points(guest.id).await, 30);

    let flagged = h
        .transactions()
        .set_suspicious(manager.id, award_id, true)
        .await
        .unwrap();
    assert!(flagged.transaction.suspicious);
    assert_eq!(h.points(guest.id).await, 0);

    h.transactions()
        .set_suspicious(manager.id, award_id, false)
        .await
        .unwrap();
    assert_eq!(h.points(guest.id).await, 30);
    h.no_negative_balances().await;
}

// ==================== Adjustments ====================

#[tokio::test]
async fn test_adjustment_cannot_overdraw() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let customer = h.user("student1", UserRole::Regular, 0).await;

    let original = h
        .transactions()
        .create_purchase(cashier.id, purchase("student1", 2.5, vec![]))
        .await
        .unwrap();
    assert_eq!(h.points(customer.id).await, 10);

    let adjust = |amount| AdjustmentInput {
        utorid: "student1".to_string(),
        amount,
        related_id: original.transaction.id,
        promotion_ids: vec![],
        remark: Some("correction".to_string()),
    };

    let err = h
        .transactions()
        .create_adjustment(manager.id, adjust(-20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientBalance {
            required: 20,
            available: 10
        }
    ));
    assert_eq!(PointTransaction::find().count(h.db.connection()).await.unwrap(), 1);

    let adjusted = h
        .transactions()
        .create_adjustment(manager.id, adjust(-4))
        .await
        .unwrap();
    assert_eq!(adjusted.transaction.related_id, Some(original.transaction.id));
    assert_eq!(h.points(customer.id).await, 6);

    let err = h
        .transactions()
        .create_adjustment(cashier.id, adjust(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    h.no_negative_balances().await;
}

#[tokio::test]
async fn test_adjustment_needs_existing_transaction() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    h.user("student1", UserRole::Regular, 0).await;

    let err = h
        .transactions()
        .create_adjustment(
            manager.id,
            AdjustmentInput {
                utorid: "student1".to_string(),
                amount: 5,
                related_id: 404,
                promotion_ids: vec![],
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ==================== Transfers ====================

#[tokio::test]
async fn test_transfer_moves_points_atomically() {
    let h = Harness::new().await;
    let sender = h.user("student1", UserRole::Regular, 100).await;
    let recipient = h.user("student2", UserRole::Regular, 0).await;

    let created = h
        .transactions()
        .create_transfer(
            sender.id,
            TransferInput {
                utorid: "student2".to_string(),
                amount: 30,
                remark: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.transaction.points, -30);
    assert_eq!(created.transaction.related_id, Some(recipient.id));
    assert_eq!(h.points(sender.id).await, 70);
    assert_eq!(h.points(recipient.id).await, 30);

    let err = h
        .transactions()
        .create_transfer(
            sender.id,
            TransferInput {
                utorid: "student2".to_string(),
                amount: 500,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
    assert_eq!(h.points(sender.id).await, 70);
    assert_eq!(h.points(recipient.id).await, 30);

    let err = h
        .transactions()
        .create_transfer(
            sender.id,
            TransferInput {
                utorid: "student1".to_string(),
                amount: 5,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

// ==================== Redemptions ====================

#[tokio::test]
async fn test_redemption_is_two_phase() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let student = h.user("student1", UserRole::Regular, 100).await;

    let requested = h
        .transactions()
        .request_redemption(
            student.id,
            RedemptionInput {
                amount: 100,
                remark: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(requested.transaction.points, -100);
    assert_eq!(requested.transaction.related_id, None);
    assert_eq!(h.points(student.id).await, 100);

    let processed = h
        .transactions()
        .process_redemption(cashier.id, requested.transaction.id)
        .await
        .unwrap();
    assert_eq!(processed.transaction.related_id, Some(cashier.id));
    assert_eq!(h.points(student.id).await, 0);

    let err = h
        .transactions()
        .process_redemption(cashier.id, requested.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.points(student.id).await, 0);
}

#[tokio::test]
async fn test_redemption_above_balance_is_rejected() {
    let h = Harness::new().await;
    let student = h.user("student1", UserRole::Regular, 10).await;

    let err = h
        .transactions()
        .request_redemption(
            student.id,
            RedemptionInput {
                amount: 11,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
}

#[tokio::test]
async fn test_spent_points_block_redemption_processing() {
    let h = Harness::new().await;
    let cashier = h.user("cashier1", UserRole::Cashier, 0).await;
    let student = h.user("student1", UserRole::Regular, 100).await;
    h.user("student2", UserRole::Regular, 0).await;

    let requested = h
        .transactions()
        .request_redemption(
            student.id,
            RedemptionInput {
                amount: 80,
                remark: None,
            },
        )
        .await
        .unwrap();
    h.transactions()
        .create_transfer(
            student.id,
            TransferInput {
                utorid: "student2".to_string(),
                amount: 50,
                remark: None,
            },
        )
        .await
        .unwrap();

    let err = h
        .transactions()
        .process_redemption(cashier.id, requested.transaction.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance { .. }));
    assert_eq!(h.points(student.id).await, 50);

    // The failed attempt rolled back, so the redemption is still pending.
    let pending = PointTransaction::find_by_id(requested.transaction.id)
        .one(h.db.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.related_id, None);
}

// ==================== Events ====================

#[tokio::test]
async fn test_capacity_tracks_guest_list() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    h.user("student1", UserRole::Regular, 0).await;
    let second = h.user("student2", UserRole::Regular, 0).await;
    h.user("student3", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), Some(2), 100)
        .await
        .unwrap();

    let events = h.events();
    events.add_guest(manager.id, event.id, "student1").await.unwrap();
    let added = events.add_guest(manager.id, event.id, "student2").await.unwrap();
    assert_eq!(added.num_guests, 2);
    assert_eq!(h.event(event.id).await.space_remain, Some(0));

    let err = events
        .add_guest(manager.id, event.id, "student3")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gone(_)));

    events
        .remove_guest(manager.id, event.id, second.id)
        .await
        .unwrap();
    assert_eq!(h.event(event.id).await.space_remain, Some(1));
}

#[tokio::test]
async fn test_rsvp_rules() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let student = h.user("student1", UserRole::Regular, 0).await;
    let organizer = h.user("student2", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), Some(5), 100)
        .await
        .unwrap();

    let events = h.events();
    events
        .add_organizer(manager.id, event.id, "student2")
        .await
        .unwrap();

    let joined = events.rsvp(student.id, event.id).await.unwrap();
    assert_eq!(joined.guest_added.utorid, "student1");
    assert_eq!(h.event(event.id).await.space_remain, Some(4));

    let err = events.rsvp(student.id, event.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    let err = events.rsvp(organizer.id, event.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    events.cancel_rsvp(student.id, event.id).await.unwrap();
    assert_eq!(h.event(event.id).await.space_remain, Some(5));

    let err = events.cancel_rsvp(student.id, event.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_award_conserves_event_budget() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let first = h.user("student1", UserRole::Regular, 0).await;
    let second = h.user("student2", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();

    let events = h.events();
    events.add_guest(manager.id, event.id, "student1").await.unwrap();
    events.add_guest(manager.id, event.id, "student2").await.unwrap();

    let award = |utorid: Option<&str>, amount| AwardInput {
        utorid: utorid.map(str::to_string),
        amount,
        remark: None,
    };

    let awarded = h
        .transactions()
        .award_event_points(manager.id, event.id, award(None, 30))
        .await
        .unwrap();
    assert_eq!(awarded.len(), 2);
    assert!(awarded
        .iter()
        .all(|t| t.transaction.related_id == Some(event.id) && t.transaction.points == 30));

    let after = h.event(event.id).await;
    assert_eq!(after.points_remain, 40);
    assert_eq!(after.points_awarded, 60);
    assert_eq!(after.total_points(), 100);

    let err = h
        .transactions()
        .award_event_points(manager.id, event.id, award(None, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert_eq!(h.points(first.id).await, 30);
    assert_eq!(h.points(second.id).await, 30);
    assert_eq!(h.event(event.id).await.points_remain, 40);

    h.transactions()
        .award_event_points(manager.id, event.id, award(Some("student2"), 40))
        .await
        .unwrap();
    let drained = h.event(event.id).await;
    assert_eq!(drained.points_remain, 0);
    assert_eq!(drained.total_points(), 100);
    assert_eq!(h.points(second.id).await, 70);
}

#[tokio::test]
async fn test_award_requires_guest_recipient() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    h.user("student1", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();

    let err = h
        .transactions()
        .award_event_points(
            manager.id,
            event.id,
            AwardInput {
                utorid: None,
                amount: 10,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    let err = h
        .transactions()
        .award_event_points(
            manager.id,
            event.id,
            AwardInput {
                utorid: Some("student1".to_string()),
                amount: 10,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_adding_guest_after_event_ends_is_gone() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    h.user("student1", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), Some(5), 100)
        .await
        .unwrap();

    let mut ended: event::ActiveModel = event.clone().into();
    ended.end_time = Set((Utc::now() - Duration::minutes(5)).into());
    ended.update(h.db.connection()).await.unwrap();

    let err = h
        .events()
        .add_guest(manager.id, event.id, "student1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Gone(_)));
    assert_eq!(h.event(event.id).await.space_remain, Some(5));
}

#[tokio::test]
async fn test_event_details_freeze_once_started() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();

    let err = h
        .events()
        .update(
            manager.id,
            event.id,
            UpdateEventInput {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert_eq!(h.event(event.id).await.name, event.name);

    let later = Utc::now() + Duration::days(2);
    let extended = h
        .events()
        .update(
            manager.id,
            event.id,
            UpdateEventInput {
                end_time: Some(later),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(extended.end_time.timestamp(), later.timestamp());

    let mut ended: event::ActiveModel = extended.into();
    ended.end_time = Set((Utc::now() - Duration::minutes(5)).into());
    ended.update(h.db.connection()).await.unwrap();

    let err = h
        .events()
        .update(
            manager.id,
            event.id,
            UpdateEventInput {
                end_time: Some(later),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_budget_cannot_drop_below_awarded() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    h.user("student1", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();

    h.events()
        .add_guest(manager.id, event.id, "student1")
        .await
        .unwrap();
    h.transactions()
        .award_event_points(
            manager.id,
            event.id,
            AwardInput {
                utorid: None,
                amount: 60,
                remark: None,
            },
        )
        .await
        .unwrap();

    let budget = |points| UpdateEventInput {
        points: Some(points),
        ..Default::default()
    };

    let err = h
        .events()
        .update(manager.id, event.id, budget(50))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert_eq!(h.event(event.id).await.points_remain, 40);

    let raised = h
        .events()
        .update(manager.id, event.id, budget(150))
        .await
        .unwrap();
    assert_eq!(raised.points_remain, 90);
    assert_eq!(raised.total_points(), 150);
}

#[tokio::test]
async fn test_capacity_can_be_lifted() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let start = Utc::now() + Duration::days(1);

    let created = h
        .events()
        .create(
            manager.id,
            CreateEventInput {
                name: "Board games".to_string(),
                description: "Weekly meetup".to_string(),
                location: "Sidney Smith Hall".to_string(),
                start_time: start,
                end_time: start + Duration::hours(3),
                capacity: Some(2),
                points: 50,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.space_remain, Some(2));

    let capacity = |capacity| UpdateEventInput {
        capacity: Some(capacity),
        ..Default::default()
    };

    let resized = h
        .events()
        .update(manager.id, created.id, capacity(Some(5)))
        .await
        .unwrap();
    assert_eq!(resized.capacity, Some(5));
    assert_eq!(resized.space_remain, Some(5));

    let unlimited = h
        .events()
        .update(manager.id, created.id, capacity(None))
        .await
        .unwrap();
    assert_eq!(unlimited.capacity, None);
    assert_eq!(unlimited.space_remain, None);
}

#[tokio::test]
async fn test_award_by_non_organizer_forbidden() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let outsider = h.user("student2", UserRole::Regular, 0).await;
    let guest = h.user("student1", UserRole::Regular, 0).await;
    let event = seed_running_event(h.db.connection(), None, 100)
        .await
        .unwrap();
    h.events()
        .add_guest(manager.id, event.id, "student1")
        .await
        .unwrap();

    let err = h
        .transactions()
        .award_event_points(
            outsider.id,
            event.id,
            AwardInput {
                utorid: Some("student1".to_string()),
                amount: 10,
                remark: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(h.points(guest.id).await, 0);
    assert_eq!(h.event(event.id).await.points_remain, 100);
}

// ==================== Promotions ====================

#[tokio::test]
async fn test_running_promotion_is_locked() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let running = seed_active_promotion(
        h.db.connection(),
        PromotionKind::Automatic,
        None,
        Some(5),
        None,
    )
    .await
    .unwrap();

    let err = h
        .promotions()
        .delete(manager.id, running.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h
        .promotions()
        .update(
            manager.id,
            running.id,
            UpdatePromotionInput {
                points: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    let later = Utc::now() + Duration::days(7);
    let extended = h
        .promotions()
        .update(
            manager.id,
            running.id,
            UpdatePromotionInput {
                end_time: Some(later),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(extended.end_time.timestamp(), later.timestamp());
    assert_eq!(extended.points, Some(5));
}

// ==================== Roles ====================

#[tokio::test]
async fn test_role_changes_follow_hierarchy() {
    let h = Harness::new().await;
    let manager = h.user("manager1", UserRole::Manager, 0).await;
    let other_manager = h.user("manager2", UserRole::Manager, 0).await;
    let student = h.user("student1", UserRole::Regular, 0).await;
    let flagged = h.user("student2", UserRole::Regular, 0).await;

    let mut active: user::ActiveModel = flagged.clone().into();
    active.suspicious = Set(true);
    active.update(h.db.connection()).await.unwrap();

    let users = h.users();
    let promoted = users
        .update_role(manager.id, student.id, UserRole::Cashier)
        .await
        .unwrap();
    assert_eq!(promoted.role, UserRole::Cashier);

    let err = users
        .update_role(manager.id, other_manager.id, UserRole::Regular)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = users
        .update_role(manager.id, flagged.id, UserRole::Cashier)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}
