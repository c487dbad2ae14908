//! SQLite store integration tests.

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use clinipay_types::{
        Currency, DomainError, NewRefund, NewTransaction, OrphanEvent, PaymentMethod, Provider,
        RefundStatus, StoreError, TransactionStatus, TransactionStore, Transition,
        TransitionPatch,
    };

    use crate::SqliteStore;

    async fn setup_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn card_payment(reference: Option<&str>) -> NewTransaction {
        NewTransaction {
            reference: reference.map(String::from),
            provider: Provider::CardGateway,
            method: PaymentMethod::Card,
            amount: dec!(5000),
            currency: Currency::KES,
            clinic_id: "clinic-1".into(),
            invoice_id: Some("inv-42".into()),
            patient_id: Some("patient-7".into()),
            customer_email: "patient@example.com".into(),
            customer_phone: None,
            metadata: serde_json::json!({"visit": "consultation"}),
        }
    }

    fn mobile_payment(reference: Option<&str>) -> NewTransaction {
        NewTransaction {
            reference: reference.map(String::from),
            provider: Provider::MobileMoneyGateway,
            method: PaymentMethod::MobileMoney,
            amount: dec!(1200),
            currency: Currency::KES,
            clinic_id: "clinic-1".into(),
            invoice_id: None,
            patient_id: None,
            customer_email: "patient@example.com".into(),
            customer_phone: Some("0712345678".into()),
            metadata: serde_json::Value::Null,
        }
    }

    async fn completed_transaction(store: &SqliteStore, reference: &str) {
        store.create(card_payment(Some(reference))).await.unwrap();
        store
            .transition(
                reference,
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_generates_reference() {
        let store = setup_store().await;

        let tx = store.create(card_payment(None)).await.unwrap();

        assert!(tx.reference.starts_with("CP-"));
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, dec!(5000));
        assert!(!tx.reconciliation_flag);
    }

    #[tokio::test]
    async fn test_create_normalizes_phone() {
        let store = setup_store().await;

        let tx = store.create(mobile_payment(Some("R-m1"))).await.unwrap();

        assert_eq!(tx.customer_phone.as_deref(), Some("254712345678"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_amount() {
        let store = setup_store().await;

        let mut input = card_payment(None);
        input.amount = dec!(0);

        let result = store.create(input).await;
        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_conflict() {
        let store = setup_store().await;

        store.create(card_payment(Some("R-dup"))).await.unwrap();
        let result = store.create(card_payment(Some("R-dup"))).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-1"))).await.unwrap();

        let first = store
            .transition(
                "R-1",
                TransactionStatus::Completed,
                TransitionPatch {
                    external_id: Some("prov-99".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        match first {
            Transition::Applied(tx) => {
                assert_eq!(tx.status, TransactionStatus::Completed);
                assert_eq!(tx.external_id.as_deref(), Some("prov-99"));
                assert!(tx.completed_at.is_some());
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_agreeing_duplicate_is_idempotent() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-2"))).await.unwrap();

        store
            .transition(
                "R-2",
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();

        let replay = store
            .transition(
                "R-2",
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();

        match replay {
            Transition::AlreadySettled(tx) => {
                assert_eq!(tx.status, TransactionStatus::Completed);
                assert!(!tx.reconciliation_flag);
            }
            other => panic!("expected AlreadySettled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disagreeing_terminal_sets_flag_without_overwrite() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-3"))).await.unwrap();

        store
            .transition(
                "R-3",
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();

        let conflict = store
            .transition("R-3", TransactionStatus::Failed, TransitionPatch::default())
            .await
            .unwrap();

        match conflict {
            Transition::Conflicted(tx) => {
                // Stored status stays authoritative; only the flag flips.
                assert_eq!(tx.status, TransactionStatus::Completed);
                assert!(tx.reconciliation_flag);
            }
            other => panic!("expected Conflicted, got {:?}", other),
        }

        let stored = store.get_by_reference("R-3").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
        assert!(stored.reconciliation_flag);
    }

    #[tokio::test]
    async fn test_transition_rejects_non_terminal_target() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-4"))).await.unwrap();

        let result = store
            .transition(
                "R-4",
                TransactionStatus::Pending,
                TransitionPatch::default(),
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_flagged_pending_transaction_refuses_transitions() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-flag"))).await.unwrap();

        let flagged = store
            .flag_for_reconciliation("R-flag", "provider confirmed 4000 but 5000 was requested")
            .await
            .unwrap();
        assert!(flagged.reconciliation_flag);
        assert_eq!(flagged.status, TransactionStatus::Pending);

        let attempt = store
            .transition(
                "R-flag",
                TransactionStatus::Completed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();
        match attempt {
            Transition::Conflicted(tx) => {
                assert_eq!(tx.status, TransactionStatus::Pending);
                assert!(tx.reconciliation_flag);
            }
            other => panic!("expected Conflicted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkout_id_lookup() {
        let store = setup_store().await;
        store.create(mobile_payment(Some("R-m2"))).await.unwrap();

        store.set_checkout_id("R-m2", "ws_CO_777").await.unwrap();

        let tx = store.find_by_checkout_id("ws_CO_777").await.unwrap().unwrap();
        assert_eq!(tx.reference, "R-m2");

        assert!(store.find_by_checkout_id("ws_CO_nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refund_requires_completed_original() {
        let store = setup_store().await;
        store.create(card_payment(Some("R-5"))).await.unwrap();

        let result = store
            .record_refund(
                "R-5",
                NewRefund {
                    refund_reference: "RF-1".into(),
                    amount: dec!(100),
                    reason: "duplicate charge".into(),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::Domain(DomainError::Refund(_)))
        ));
    }

    #[tokio::test]
    async fn test_partial_refunds_never_exceed_original() {
        let store = setup_store().await;
        completed_transaction(&store, "R-6").await;

        // Original amount is 5000: 3000 then 2500 must fail, 3000 then 2000 fits.
        store
            .record_refund(
                "R-6",
                NewRefund {
                    refund_reference: "RF-2".into(),
                    amount: dec!(3000),
                    reason: "overpayment".into(),
                },
            )
            .await
            .unwrap();

        let too_much = store
            .record_refund(
                "R-6",
                NewRefund {
                    refund_reference: "RF-3".into(),
                    amount: dec!(2500),
                    reason: "overpayment".into(),
                },
            )
            .await;
        assert!(matches!(
            too_much,
            Err(StoreError::Domain(DomainError::Refund(_)))
        ));

        store
            .record_refund(
                "R-6",
                NewRefund {
                    refund_reference: "RF-4".into(),
                    amount: dec!(2000),
                    reason: "overpayment".into(),
                },
            )
            .await
            .unwrap();

        // Original stays Completed throughout.
        let original = store.get_by_reference("R-6").await.unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_refunds_one_clean_winner() {
        // On-disk database so the pool hands out multiple connections and
        // the two reservations genuinely contend for the write lock.
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/refunds.db", dir.path().display());
        let store = SqliteStore::new(&url).await.unwrap();
        completed_transaction(&store, "R-RACE").await;

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_refund(
                        "R-RACE",
                        NewRefund {
                            refund_reference: "RF-A".into(),
                            amount: dec!(3000),
                            reason: "overpayment".into(),
                        },
                    )
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .record_refund(
                        "R-RACE",
                        NewRefund {
                            refund_reference: "RF-B".into(),
                            amount: dec!(3000),
                            reason: "overpayment".into(),
                        },
                    )
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        // The loser is a clean over-refund rejection, never a busy error.
        for result in results {
            if let Err(e) = result {
                assert!(matches!(e, StoreError::Domain(DomainError::Refund(_))));
            }
        }

        let refunds = store.list_refunds("R-RACE").await.unwrap();
        assert_eq!(refunds.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refund_releases_reservation() {
        let store = setup_store().await;
        completed_transaction(&store, "R-7").await;

        store
            .record_refund(
                "R-7",
                NewRefund {
                    refund_reference: "RF-5".into(),
                    amount: dec!(5000),
                    reason: "full refund".into(),
                },
            )
            .await
            .unwrap();

        // Provider rejected it; the reservation no longer counts.
        store
            .complete_refund("RF-5", RefundStatus::Failed)
            .await
            .unwrap();

        store
            .record_refund(
                "R-7",
                NewRefund {
                    refund_reference: "RF-6".into(),
                    amount: dec!(5000),
                    reason: "full refund retry".into(),
                },
            )
            .await
            .unwrap();

        let refunds = store.list_refunds("R-7").await.unwrap();
        assert_eq!(refunds.len(), 2);
    }

    #[tokio::test]
    async fn test_orphan_event_round_trip() {
        let store = setup_store().await;

        let event = OrphanEvent::new(
            Provider::MobileMoneyGateway,
            "ws_CO_unknown",
            serde_json::json!({"ResultCode": 0}),
        );
        store.store_orphan_event(event.clone()).await.unwrap();

        let events = store.list_orphan_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_key, "ws_CO_unknown");
        assert_eq!(events[0].provider, Provider::MobileMoneyGateway);
    }

    #[tokio::test]
    async fn test_history_by_clinic_and_patient() {
        let store = setup_store().await;

        store.create(card_payment(Some("R-8"))).await.unwrap();
        store.create(mobile_payment(Some("R-9"))).await.unwrap();

        let all = store.list_by_clinic("clinic-1", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let for_patient = store
            .list_by_clinic("clinic-1", Some("patient-7"))
            .await
            .unwrap();
        assert_eq!(for_patient.len(), 1);
        assert_eq!(for_patient[0].reference, "R-8");

        let other_clinic = store.list_by_clinic("clinic-2", None).await.unwrap();
        assert!(other_clinic.is_empty());
    }
}
