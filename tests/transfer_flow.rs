mod common;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use common::*;
use proptest::prelude::*;
use wallet_settlement::app::App;
use wallet_settlement::core::orchestrator::AmountInput;
use wallet_settlement::error::{Error, ErrorKind, Result};
use wallet_settlement::interfaces::invoice_store::InvoiceStore;
use wallet_settlement::interfaces::ledger_store::LedgerStore;
use wallet_settlement::interfaces::notifier::{Notifier, TransactionEmail};
use wallet_settlement::interfaces::transaction_store::TransactionStore;
use wallet_settlement::models::invoice::InvoiceStatus;
use wallet_settlement::models::transaction::{TransactionStatus, TransactionType};
use wallet_settlement::settlement::ledger::EntryType;
use wallet_settlement::settlement::accounts::WalletAccount;
use wallet_settlement::types::amount::Amount;
use wallet_settlement::types::ids::WalletId;
use wallet_settlement::verification::pin::{hash_pin, PinDigit, PinInput};

mockall::mock! {
    pub Mailer {}

    #[async_trait]
    impl Notifier for Mailer {
        async fn send_transaction_email(&self, email: TransactionEmail) -> Result<()>;
    }
}

#[tokio::test]
async fn plain_transfer_moves_the_exact_amount() {
    let h = Harness::new();
    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 2_000, "lunch", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(receipt.message, "Transfer successful");
    assert_eq!(receipt.amount.minor(), 2_000);
    assert_eq!(receipt.fee.minor(), 0);
    assert_eq!(receipt.net_amount.minor(), 2_000);
    assert_eq!(receipt.receiver_name, "Bayo Musa");
    assert!(receipt.invoice_payment.is_none());
    assert!(receipt.sender_ref.starts_with("P2P-"));
    assert!(receipt.receiver_ref.starts_with("P2PCR-"));

    assert_eq!(h.balance(h.ada.user_id), 8_000);
    assert_eq!(h.balance(h.bayo.user_id), 2_000);
    assert_eq!(h.platform_balance(), 0);

    let rows = h.app.store.find_by_correlation(receipt.correlation_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let sent = rows.iter().find(|r| r.reference == receipt.sender_ref).unwrap();
    assert_eq!(sent.transaction_type, TransactionType::P2pTransfer);
    assert_eq!(sent.status, TransactionStatus::Success);
    assert_eq!(sent.linked_reference.as_deref(), Some(receipt.receiver_ref.as_str()));
    let received = rows.iter().find(|r| r.reference == receipt.receiver_ref).unwrap();
    assert_eq!(received.transaction_type, TransactionType::P2pCredit);
    assert_eq!(received.amount.minor(), 2_000);
    assert_eq!(received.user_id, h.bayo.user_id);
}

#[tokio::test]
async fn single_payment_invoice_is_paid_and_fee_goes_to_platform() {
    let h = Harness::new();
    let invoice = h.invoice_for(&h.bayo, "INV-AB12", 5_000, 1, false);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 5_000, "Payment for INV-AB12", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(receipt.message, "Invoice payment successful");
    assert_eq!(receipt.fee.minor(), 100);
    assert_eq!(receipt.net_amount.minor(), 4_900);
    let summary = receipt.invoice_payment.clone().unwrap();
    assert_eq!(summary.invoice_code, "INV-AB12");
    assert_eq!(summary.status, InvoiceStatus::Paid);

    assert_eq!(h.balance(h.ada.user_id), 5_000);
    assert_eq!(h.balance(h.bayo.user_id), 4_900);
    assert_eq!(h.platform_balance(), 100);

    let stored = h.app.store.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert_eq!(stored.paid_amount.minor(), 5_000);
    assert_eq!(stored.paid_quantity, 1);
    assert!(stored.paid_at.is_some());

    let payments = h.app.store.payments_for_invoice(invoice.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].fee.minor(), 100);
    assert_eq!(payments[0].net_amount.minor(), 4_900);

    let received = h.app.store.find_by_reference(&receipt.receiver_ref).await.unwrap().unwrap();
    assert_eq!(received.transaction_type, TransactionType::InvoicePayment);
    assert_eq!(received.fee.minor(), 100);
    assert_eq!(received.amount.minor(), 4_900);
}

#[tokio::test]
async fn partial_payment_on_multi_unit_invoice() {
    let h = Harness::new();
    let invoice = h.invoice_for(&h.bayo, "INV-MU01", 10_000, 1, true);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 4_000, "INV-MU01 deposit", ADA_PIN))
        .await
        .unwrap();

    let summary = receipt.invoice_payment.unwrap();
    assert_eq!(summary.status, InvoiceStatus::PartiallyPaid);
    let stored = h.app.store.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::PartiallyPaid);
    assert_eq!(stored.paid_amount.minor(), 4_000);
    assert_eq!(stored.paid_quantity, 0);
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
async fn invoice_code_matches_regardless_of_case() {
    let h = Harness::new();
    let invoice = h.invoice_for(&h.bayo, "INV-AB12", 5_000, 1, false);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 5_000, "paying inv-ab12 now", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(receipt.invoice_payment.unwrap().invoice_id, invoice.id);
}

#[tokio::test]
async fn invoice_owned_by_someone_else_is_a_plain_transfer() {
    let h = Harness::new();
    let carol = open_wallet(&h.app.store, "Carol Eze", "9000000003", "5555", 0);
    let invoice = h.invoice_for(&carol, "INV-CR01", 2_000, 1, false);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 2_000, "INV-CR01", ADA_PIN))
        .await
        .unwrap();

    assert!(receipt.invoice_payment.is_none());
    assert_eq!(h.balance(h.bayo.user_id), 2_000);
    assert_eq!(h.platform_balance(), 0);
    let stored = h.app.store.get_invoice(invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Unpaid);
    assert!(h.app.store.payments_for_invoice(invoice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejections_leave_balances_untouched() {
    let h = Harness::new();
    let outsider = h
        .app
        .store
        .create_wallet(WalletAccount::new("Dayo Ige", "Other Bank", "0123456789", hash_pin("0000")))
        .unwrap();
    let transfers = &h.app.state.transfers;

    let err = transfers.execute(transfer(&h.ada, &h.ada, 400, "me", ADA_PIN)).await.unwrap_err();
    assert!(matches!(err, Error::SelfTransfer));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = transfers.execute(transfer(&h.ada, &h.bayo, 20_000, "too much", ADA_PIN)).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let err = transfers.execute(transfer(&h.ada, &h.bayo, 400, "x", "9999")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidPin));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = transfers.execute(transfer(&h.ada, &outsider, 400, "x", ADA_PIN)).await.unwrap_err();
    assert!(matches!(err, Error::BankNotAllowed { .. }));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let mut ghost = h.bayo.clone();
    ghost.wallet_id = WalletId::new();
    let err = transfers.execute(transfer(&h.ada, &ghost, 400, "x", ADA_PIN)).await.unwrap_err();
    assert!(matches!(err, Error::ReceiverNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = transfers.execute(transfer(&h.ada, &h.bayo, 99, "x", ADA_PIN)).await.unwrap_err();
    assert!(matches!(err, Error::AmountBelowMinimum { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut missing = transfer(&h.ada, &h.bayo, 400, "x", ADA_PIN);
    missing.pin = None;
    let err = transfers.execute(missing).await.unwrap_err();
    assert!(matches!(err, Error::MissingField("pin")));

    assert_eq!(h.balance(h.ada.user_id), 10_000);
    assert_eq!(h.balance(h.bayo.user_id), 0);
}

#[tokio::test]
async fn pin_may_arrive_as_digit_array() {
    let h = Harness::new();
    let mut request = transfer(&h.ada, &h.bayo, 500, "digits", ADA_PIN);
    request.pin = Some(PinInput::Digits(vec![
        PinDigit::Number(1),
        PinDigit::Number(2),
        PinDigit::Text("3".into()),
        PinDigit::Number(4),
    ]));

    h.app.state.transfers.execute(request).await.unwrap();
    assert_eq!(h.balance(h.bayo.user_id), 500);
}

#[tokio::test]
async fn failed_credit_refunds_the_sender() {
    let app = app_with(
        |store| Arc::new(FailingCredits::new(store, EntryType::P2pCredit, u32::MAX)),
        |store| store,
    );
    let h = Harness::around(app);

    let err = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 3_000, "rent", ADA_PIN))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CreditFailed { refunded: true, .. }));
    assert_eq!(err.refunded(), Some(true));
    assert_eq!(h.balance(h.ada.user_id), 10_000);
    assert_eq!(h.balance(h.bayo.user_id), 0);

    let history = h.app.store.entries_for_user(h.ada.user_id).await.unwrap();
    assert!(history.iter().any(|e| e.entry_type == EntryType::Refund && e.amount.minor() == 3_000));

    let rows = h.app.store.list_for_user(h.ada.user_id).await.unwrap();
    let sent = rows.iter().find(|r| r.transaction_type == TransactionType::P2pTransfer).unwrap();
    assert_eq!(sent.status, TransactionStatus::Failed);
    assert!(h.app.store.list_for_user(h.bayo.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn landed_credit_with_lost_acknowledgement_completes() {
    let app = app_with(|store| Arc::new(LostCreditAcks::new(store, 1, false)), |store| store);
    let h = Harness::around(app);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 3_000, "rent", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(receipt.net_amount.minor(), 3_000);
    assert_eq!(h.balance(h.ada.user_id), 7_000);
    assert_eq!(h.balance(h.bayo.user_id), 3_000);
    let history = h.app.store.entries_for_user(h.ada.user_id).await.unwrap();
    assert!(history.iter().all(|e| e.entry_type != EntryType::Refund));
}

#[tokio::test]
async fn unknown_credit_is_replayed_under_the_same_key() {
    let app = app_with(|store| Arc::new(LostCreditAcks::new(store, 1, true)), |store| store);
    let h = Harness::around(app);

    h.app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 3_000, "rent", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(h.balance(h.ada.user_id), 7_000);
    assert_eq!(h.balance(h.bayo.user_id), 3_000);
    let credits = h.app.store.entries_for_user(h.bayo.user_id).await.unwrap();
    assert_eq!(credits.len(), 1);
}

#[tokio::test]
async fn unresolved_credit_is_never_refunded() {
    let app = app_with(|store| Arc::new(LostCreditAcks::new(store, u32::MAX, true)), |store| store);
    let h = Harness::around(app);

    let err = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 3_000, "rent", ADA_PIN))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CreditFailed { refunded: false, .. }));
    assert_eq!(h.balance(h.ada.user_id) + h.balance(h.bayo.user_id), 10_000);
    assert_eq!(h.balance(h.bayo.user_id), 3_000);
    let history = h.app.store.entries_for_user(h.ada.user_id).await.unwrap();
    assert!(history.iter().all(|e| e.entry_type != EntryType::Refund));
}

#[tokio::test]
async fn same_idempotency_key_settles_once() {
    let h = Harness::new();
    let mut request = transfer(&h.ada, &h.bayo, 2_000, "lunch", ADA_PIN);
    request.idempotency_key = Some("lunch-001".into());

    let first = h.app.state.transfers.execute(request.clone()).await.unwrap();
    let second = h.app.state.transfers.execute(request.clone()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(h.balance(h.ada.user_id), 8_000);

    request.amount = Some(AmountInput::Minor(3_000));
    let err = h.app.state.transfers.execute(request).await.unwrap_err();
    assert!(matches!(err, Error::IdempotencyKeyReuse(_)));
    assert_eq!(h.balance(h.ada.user_id), 8_000);
}

#[tokio::test]
async fn rejected_key_can_be_retried() {
    let h = Harness::new();
    let mut request = transfer(&h.ada, &h.bayo, 12_000, "big", ADA_PIN);
    request.idempotency_key = Some("big-001".into());

    let err = h.app.state.transfers.execute(request.clone()).await.unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds { .. }));

    h.app
        .store
        .deposit(h.ada.user_id, Amount::from_minor(5_000), "top-up-1")
        .unwrap();
    h.app.state.transfers.execute(request).await.unwrap();
    assert_eq!(h.balance(h.ada.user_id), 3_000);
    assert_eq!(h.balance(h.bayo.user_id), 12_000);
}

#[tokio::test]
async fn concurrent_transfers_never_overdraw() {
    let h = Harness::new();
    let app = Arc::new(h.app);

    let mut handles = Vec::new();
    for i in 0..10 {
        let app = app.clone();
        let request = transfer(&h.ada, &h.bayo, 2_000, &format!("split {i}"), ADA_PIN);
        handles.push(tokio::spawn(async move { app.state.transfers.execute(request).await }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, Error::InsufficientFunds { .. }), "unexpected {e}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(app.store.balance_of(h.ada.user_id).unwrap().minor(), 0);
    assert_eq!(app.store.balance_of(h.bayo.user_id).unwrap().minor(), 10_000);
}

#[tokio::test]
async fn notifier_failure_does_not_fail_the_transfer() {
    let mut mailer = MockMailer::new();
    mailer
        .expect_send_transaction_email()
        .returning(|_| Err(Error::Store("smtp down".into())));

    let app = App::in_memory(test_config(), Arc::new(mailer)).unwrap();
    let h = Harness::around(app);

    h.app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 1_000, "coffee", ADA_PIN))
        .await
        .unwrap();
    assert_eq!(h.balance(h.bayo.user_id), 1_000);

    let mut dead = 0;
    for _ in 0..50 {
        dead = h.app.services.notifications.dead_letter_count().await;
        if dead == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(dead, 2);
}

#[tokio::test]
async fn halted_transfers_are_refused() {
    let h = Harness::new();
    h.app.services.controls.halt_transfers();

    let err = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 1_000, "x", ADA_PIN))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Halted(_)));

    h.app.services.controls.resume_transfers();
    h.app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 1_000, "x", ADA_PIN))
        .await
        .unwrap();
}

#[tokio::test]
async fn lost_receiver_row_is_replayed_from_the_outbox() {
    let app = app_with(|store| store, |store| Arc::new(FailingInserts::new(store, "P2PCR-", 1)));
    let h = Harness::around(app);

    let receipt = h
        .app
        .state
        .transfers
        .execute(transfer(&h.ada, &h.bayo, 2_500, "books", ADA_PIN))
        .await
        .unwrap();

    assert_eq!(h.balance(h.bayo.user_id), 2_500);
    assert!(h.app.store.find_by_reference(&receipt.receiver_ref).await.unwrap().is_none());
    assert_eq!(h.app.services.outbox.len().await, 1);

    let report = h.app.services.drain_outbox().await;
    assert_eq!(report.replayed, 1);
    assert!(h.app.services.outbox.is_empty().await);
    let row = h.app.store.find_by_reference(&receipt.receiver_ref).await.unwrap().unwrap();
    assert_eq!(row.status, TransactionStatus::Success);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn money_is_conserved_across_transfers(amounts in prop::collection::vec(100i64..4_000, 1..8)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new();
            for (i, amount) in amounts.iter().enumerate() {
                let (from, to, pin) = if i % 2 == 0 {
                    (&h.ada, &h.bayo, ADA_PIN)
                } else {
                    (&h.bayo, &h.ada, BAYO_PIN)
                };
                let _ = h.app.state.transfers.execute(transfer(from, to, *amount, "ping", pin)).await;
            }
            let total = h.balance(h.ada.user_id) + h.balance(h.bayo.user_id) + h.platform_balance();
            assert_eq!(total, 10_000);
            assert!(h.balance(h.ada.user_id) >= 0);
            assert!(h.balance(h.bayo.user_id) >= 0);
        });
    }
}
