//! # End-to-End Lifecycle Flows
//!
//! Drives complete trades through `SafeTradeService`: the escrow happy path,
//! the contract path, dispute settlement, invoicing and post-trade reviews.
//! Each flow checks the persisted record, its audit chain and the
//! notifications that were delivered.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use safetrade_core::{Actor, Currency, DealerId, LifecycleError, UserId, VehicleId};
use safetrade_lifecycle::{
    LifecycleSettings, NotificationDispatcher, RecordingNotifier, Repositories, SafeTradeService,
};
use safetrade_state::{
    verify_chain, DisputeCommand, DisputeStatus, DisputeType, InvoiceCommand, InvoiceStatus,
    ModerationStatus, NewDispute, NewInvoice, NewReview, NewTransaction, Recipient,
    ResolutionType, ReviewType, Transaction, TransactionCommand, TransactionStatus,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Parties {
    buyer: Actor,
    seller: Actor,
    admin: Actor,
}

impl Parties {
    fn new() -> Self {
        Self {
            buyer: Actor::buyer(UserId::new()),
            seller: Actor::seller(UserId::new()),
            admin: Actor::admin(UserId::new()),
        }
    }
}

fn recording_service() -> (SafeTradeService, Arc<RecordingNotifier>) {
    let recorder = Arc::new(RecordingNotifier::new());
    let dispatcher = NotificationDispatcher::spawn(recorder.clone(), 64);
    let svc = SafeTradeService::new(
        Repositories::in_memory(),
        dispatcher,
        LifecycleSettings::default(),
    )
    .unwrap();
    (svc, recorder)
}

async fn wait_for_events(recorder: &RecordingNotifier, n: usize) {
    for _ in 0..100 {
        if recorder.len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} events, got {}", recorder.len());
}

async fn open(svc: &SafeTradeService, p: &Parties, amount: Decimal) -> Transaction {
    svc.open_transaction(
        NewTransaction {
            buyer_id: p.buyer.user_id.unwrap(),
            seller_id: p.seller.user_id.unwrap(),
            vehicle_id: VehicleId::new(),
            dealer_id: None,
            amount,
            currency: Currency::eur(),
            escrow_account_iban: None,
            notes: None,
        },
        &p.buyer,
    )
    .await
    .unwrap()
}

async fn step(
    svc: &SafeTradeService,
    t: &Transaction,
    cmd: TransactionCommand,
    actor: &Actor,
) -> Transaction {
    svc.transition_transaction(t.id.0, None, cmd, actor)
        .await
        .unwrap()
}

async fn run_to_completion(svc: &SafeTradeService, p: &Parties, t: &Transaction) -> Transaction {
    use TransactionStatus::*;
    step(svc, t, TransactionCommand::to(AwaitingBankTransfer), &p.seller).await;
    step(
        svc,
        t,
        TransactionCommand::to(PaymentSubmitted).with_payment_proof("mt103-2026-0012"),
        &p.buyer,
    )
    .await;
    step(svc, t, TransactionCommand::to(PaymentVerified), &p.admin).await;
    step(svc, t, TransactionCommand::to(ReadyForDelivery), &p.seller).await;
    step(svc, t, TransactionCommand::to(Delivered), &p.seller).await;
    step(svc, t, TransactionCommand::to(Completed), &p.buyer).await
}

fn complaint() -> NewDispute {
    NewDispute {
        dispute_type: DisputeType::VehicleCondition,
        reason: "Undisclosed accident damage".to_string(),
        description: "Front left panel was replaced; not mentioned in the listing.".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn escrow_happy_path_completes_with_intact_audit_chain() {
    let (svc, recorder) = recording_service();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(2_450_000, 2)).await;
    assert_eq!(t.status, TransactionStatus::Pending);
    assert!(t.transaction_code.starts_with("AS24-TXN-"));
    assert!(t.payment_reference.starts_with("AS24-REF-"));

    let done = run_to_completion(&svc, &p, &t).await;
    assert_eq!(done.status, TransactionStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.payment_confirmed_at.is_some());
    assert_eq!(done.payment_verified_by, p.admin.user_id);
    assert_eq!(done.version, t.version + 6);
    assert_eq!(done.transition_log.len(), 6);
    verify_chain(&done.transition_log).unwrap();

    wait_for_events(&recorder, 6).await;
    let events = recorder.events();
    let last = events.last().unwrap();
    assert_eq!(last.from, "delivered");
    assert_eq!(last.to, "completed");
    assert!(last.audiences.contains(&Recipient::User(p.buyer.user_id.unwrap())));
    assert!(last.audiences.contains(&Recipient::User(p.seller.user_id.unwrap())));

    let err = svc
        .transition_transaction(
            t.id.0,
            None,
            TransactionCommand::to(TransactionStatus::Cancelled).with_reason("too late"),
            &p.admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
}

#[tokio::test]
async fn contract_path_reaches_bank_transfer() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(9_900_000, 2)).await;
    use TransactionStatus::*;
    step(&svc, &t, TransactionCommand::to(ContractGenerated), &p.seller).await;
    step(&svc, &t, TransactionCommand::to(ContractSigned), &p.buyer).await;
    let t = step(&svc, &t, TransactionCommand::to(AwaitingBankTransfer), &p.buyer).await;
    assert!(t.contract_generated_at.is_some());
    assert!(t.contract_signed_at.is_some());
    assert_eq!(t.status, AwaitingBankTransfer);
}

#[tokio::test]
async fn stale_expected_status_is_conflict() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_000_000, 2)).await;
    let err = svc
        .transition_transaction(
            t.id.0,
            Some(TransactionStatus::AwaitingBankTransfer),
            TransactionCommand::to(TransactionStatus::PaymentSubmitted)
                .with_payment_proof("proof"),
            &p.buyer,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));
    assert_eq!(
        svc.transaction(t.id.0).await.unwrap().status,
        TransactionStatus::Pending
    );
}

#[tokio::test]
async fn brokered_settlement_deducts_commission() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = svc
        .open_transaction(
            NewTransaction {
                buyer_id: p.buyer.user_id.unwrap(),
                seller_id: p.seller.user_id.unwrap(),
                vehicle_id: VehicleId::new(),
                dealer_id: Some(DealerId::new()),
                amount: Decimal::new(2_000_000, 2),
                currency: Currency::eur(),
                escrow_account_iban: None,
                notes: None,
            },
            &p.admin,
        )
        .await
        .unwrap();
    let s = svc.settlement(t.id.0).await.unwrap();
    assert_eq!(s.service_fee.to_string(), "500.00");
    assert_eq!(s.dealer_commission.to_string(), "600.00");
    assert_eq!(s.seller_payout.to_string(), "18900.00");
}

#[tokio::test]
async fn soft_delete_requires_terminal_state_and_hides_record() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(600_000, 2)).await;
    assert!(svc.delete_transaction(t.id.0, &p.admin).await.is_err());

    step(
        &svc,
        &t,
        TransactionCommand::to(TransactionStatus::Cancelled).with_reason("changed my mind"),
        &p.buyer,
    )
    .await;
    assert!(matches!(
        svc.delete_transaction(t.id.0, &p.buyer).await.unwrap_err(),
        LifecycleError::Forbidden { .. }
    ));
    svc.delete_transaction(t.id.0, &p.admin).await.unwrap();
    assert!(matches!(
        svc.transaction(t.id.0).await.unwrap_err(),
        LifecycleError::NotFound { .. }
    ));
    assert!(svc.list_transactions(None).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Disputes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispute_relist_cancels_the_trade() {
    let (svc, recorder) = recording_service();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(3_100_000, 2)).await;
    step(
        &svc,
        &t,
        TransactionCommand::to(TransactionStatus::AwaitingBankTransfer),
        &p.seller,
    )
    .await;

    let d = svc.file_dispute(t.id.0, complaint(), &p.buyer).await.unwrap();
    assert_eq!(d.status, DisputeStatus::Open);
    let frozen = svc.transaction(t.id.0).await.unwrap();
    assert_eq!(frozen.status, TransactionStatus::Disputed);
    assert_eq!(frozen.disputed_from, Some(TransactionStatus::AwaitingBankTransfer));

    svc.respond_to_dispute(d.id.0, "Damage was disclosed in photo 7.".to_string(), &p.seller)
        .await
        .unwrap();
    svc.transition_dispute(d.id.0, DisputeCommand::to(DisputeStatus::Investigating), &p.admin)
        .await
        .unwrap();
    let resolved = svc
        .resolve_dispute(
            d.id.0,
            ResolutionType::RelistVehicle,
            "Listing corrected and vehicle relisted.".to_string(),
            &p.admin,
        )
        .await
        .unwrap();
    assert_eq!(resolved.status, DisputeStatus::Resolved);
    assert!(resolved.seller_response.is_some());
    verify_chain(&resolved.transition_log).unwrap();

    let settled = svc.transaction(t.id.0).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Cancelled);
    assert_eq!(settled.cancellation_reason.as_deref(), Some("relist_vehicle"));

    wait_for_events(&recorder, 5).await;
    assert!(recorder
        .events()
        .iter()
        .any(|e| e.to == "disputed" && e.notifies_admins()));
}

#[tokio::test]
async fn resolving_without_resolution_type_is_validation_failure() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_500_000, 2)).await;
    let d = svc.file_dispute(t.id.0, complaint(), &p.buyer).await.unwrap();
    svc.transition_dispute(d.id.0, DisputeCommand::to(DisputeStatus::Investigating), &p.admin)
        .await
        .unwrap();

    let cmd = DisputeCommand {
        to: Some(DisputeStatus::Resolved),
        resolution_type: None,
        resolution: Some("Settled between parties".to_string()),
        admin_notes: None,
    };
    let err = svc.transition_dispute(d.id.0, cmd, &p.admin).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ValidationFailure { .. }));
    assert_eq!(
        svc.dispute(d.id.0).await.unwrap().status,
        DisputeStatus::Investigating
    );
    assert_eq!(
        svc.transaction(t.id.0).await.unwrap().status,
        TransactionStatus::Disputed
    );
}

#[tokio::test]
async fn closed_dispute_resumes_interrupted_stage() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_500_000, 2)).await;
    step(
        &svc,
        &t,
        TransactionCommand::to(TransactionStatus::ContractGenerated),
        &p.seller,
    )
    .await;
    let d = svc.file_dispute(t.id.0, complaint(), &p.seller).await.unwrap();
    svc.transition_dispute(d.id.0, DisputeCommand::to(DisputeStatus::Closed), &p.admin)
        .await
        .unwrap();
    let resumed = svc.transaction(t.id.0).await.unwrap();
    assert_eq!(resumed.status, TransactionStatus::ContractGenerated);
    assert_eq!(resumed.disputed_from, None);

    // A new dispute may be filed once the previous one is finished.
    svc.file_dispute(t.id.0, complaint(), &p.buyer).await.unwrap();
}

#[tokio::test]
async fn parties_cannot_move_disputes() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_500_000, 2)).await;
    let d = svc.file_dispute(t.id.0, complaint(), &p.buyer).await.unwrap();
    let err = svc
        .transition_dispute(d.id.0, DisputeCommand::to(DisputeStatus::Closed), &p.buyer)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }));
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invoice_lifecycle_keeps_totals_consistent() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_190_000, 2)).await;

    let inv = svc
        .create_invoice(
            t.id.0,
            NewInvoice {
                amount: Decimal::new(100_000, 2),
                vat_percentage: None,
                due_date: None,
            },
            &p.seller,
        )
        .await
        .unwrap();
    assert_eq!(inv.status, InvoiceStatus::Draft);
    assert_eq!(inv.vat_amount.to_string(), "190.00");
    assert_eq!(inv.total_amount.to_string(), "1190.00");
    assert!(inv.amounts_consistent());

    let inv = svc
        .reprice_invoice(inv.id.0, Some(Decimal::new(123_456, 2)), None, &p.seller)
        .await
        .unwrap();
    assert!(inv.amounts_consistent());
    assert_eq!(inv.vat_amount.to_string(), "234.57");
    assert_eq!(inv.total_amount.to_string(), "1469.13");

    for (to, actor) in [
        (InvoiceStatus::Sent, &p.seller),
        (InvoiceStatus::Paid, &p.buyer),
        (InvoiceStatus::Confirmed, &p.admin),
    ] {
        svc.transition_invoice(inv.id.0, InvoiceCommand::to(to), actor)
            .await
            .unwrap();
    }
    let confirmed = svc.invoice(inv.id.0).await.unwrap();
    assert_eq!(confirmed.status, InvoiceStatus::Confirmed);
    assert_eq!(confirmed.verified_by, p.admin.user_id);
    verify_chain(&confirmed.transition_log).unwrap();

    assert!(svc
        .reprice_invoice(inv.id.0, Some(Decimal::new(1, 0)), None, &p.admin)
        .await
        .is_err());
    assert_eq!(svc.list_invoices(t.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn buyer_cannot_confirm_own_payment() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(1_190_000, 2)).await;
    let inv = svc
        .create_invoice(
            t.id.0,
            NewInvoice {
                amount: Decimal::new(50_000, 0),
                vat_percentage: Some(Decimal::new(7, 0)),
                due_date: None,
            },
            &p.admin,
        )
        .await
        .unwrap();
    svc.transition_invoice(inv.id.0, InvoiceCommand::to(InvoiceStatus::Sent), &p.admin)
        .await
        .unwrap();
    svc.transition_invoice(inv.id.0, InvoiceCommand::to(InvoiceStatus::Paid), &p.buyer)
        .await
        .unwrap();
    let err = svc
        .transition_invoice(inv.id.0, InvoiceCommand::to(InvoiceStatus::Confirmed), &p.buyer)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }));
}

// ---------------------------------------------------------------------------
// Reviews
// ---------------------------------------------------------------------------

#[tokio::test]
async fn review_after_completed_trade_is_auto_verified() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(2_200_000, 2)).await;
    run_to_completion(&svc, &p, &t).await;

    let review = svc
        .submit_review(
            t.id.0,
            NewReview {
                review_type: ReviewType::Seller,
                rating: 5,
                comment: "Smooth handover, car exactly as described.".to_string(),
            },
            &p.buyer,
        )
        .await
        .unwrap();
    assert_eq!(review.moderation_status, ModerationStatus::Approved);
    assert!(review.verified);
    assert!(review.is_publicly_visible());
    assert_eq!(review.reviewee_id, p.seller.user_id.unwrap());
}

#[tokio::test]
async fn flags_from_distinct_users_push_review_into_moderation() {
    let svc = SafeTradeService::in_memory().unwrap();
    let p = Parties::new();
    let t = open(&svc, &p, Decimal::new(2_200_000, 2)).await;
    let review = svc
        .submit_review(
            t.id.0,
            NewReview {
                review_type: ReviewType::Buyer,
                rating: 2,
                comment: "Buyer kept rescheduling the viewing appointment.".to_string(),
            },
            &p.seller,
        )
        .await
        .unwrap();
    assert_eq!(review.moderation_status, ModerationStatus::Pending);

    let first = Actor::buyer(UserId::new());
    svc.flag_review(review.id.0, &first).await.unwrap();
    assert!(matches!(
        svc.flag_review(review.id.0, &first).await.unwrap_err(),
        LifecycleError::Conflict { .. }
    ));
    svc.flag_review(review.id.0, &Actor::buyer(UserId::new()))
        .await
        .unwrap();
    let flagged = svc
        .flag_review(review.id.0, &Actor::seller(UserId::new()))
        .await
        .unwrap();
    assert_eq!(flagged.flag_count, 3);
    assert_eq!(flagged.moderation_status, ModerationStatus::Flagged);

    let rejected = svc
        .reject_review(review.id.0, "Off-topic complaint".to_string(), &p.admin)
        .await
        .unwrap();
    assert_eq!(rejected.moderation_status, ModerationStatus::Rejected);
    assert!(!rejected.is_publicly_visible());
}
