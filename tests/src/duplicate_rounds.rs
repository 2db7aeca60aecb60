//! Duplicate Round Tests
//!
//! A round number is committed at most once, whichever ledger backs the
//! logger and however often producers retry.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use screener_audit::{enqueue_pair, AuditLedger};
    use screener_shared::{collections, find_records, Filter, FindOptions, TrainingLogDocument};
    use std::time::Duration;

    fn round_docs(store: &dyn screener_shared::DocumentStore, round_number: u64) -> Vec<TrainingLogDocument> {
        find_records(
            store,
            collections::TRAINING_LOGS,
            &Filter::eq("round", round_number),
            &FindOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_mock_round_five_twice() {
        let (store, shared) = store();
        let ledger = AuditLedger::mock(Some(shared), 100);

        let first = enqueue_pair(&ledger.enqueue_training_round(round(5, 0.91)));
        let second = enqueue_pair(&ledger.enqueue_training_round(round(5, 0.91)));

        assert!(first.0);
        assert!(first.1.is_some());
        assert_eq!(second, (false, Some("duplicate".to_string())));
        assert_eq!(round_docs(store.as_ref(), 5).len(), 1);
    }

    #[tokio::test]
    async fn test_chain_round_five_twice() {
        let (store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        let first = enqueue_pair(&ledger.enqueue_training_metadata(5, 0.91, "model_r5_0123456789abcdef"));
        // still pending: the queued copy counts as a duplicate too
        let second = enqueue_pair(&ledger.enqueue_training_metadata(5, 0.91, "model_r5_0123456789abcdef"));
        assert_eq!(first, (true, None));
        assert_eq!(second, (false, Some("duplicate".to_string())));

        assert!(ledger.flush(Duration::from_secs(5)).await);
        let third = enqueue_pair(&ledger.enqueue_training_metadata(5, 0.91, "model_r5_0123456789abcdef"));
        assert_eq!(third, (false, Some("duplicate".to_string())));

        assert_eq!(chain.entries().len(), 1);
        assert_eq!(round_docs(store.as_ref(), 5).len(), 1);
        assert_eq!(ledger.health_check().logged_rounds_count, 1);
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_concurrent_producers_commit_once() {
        let (store, shared) = store();
        let chain = chain();
        let ledger = std::sync::Arc::new(chain_ledger(&chain_config(), &chain, shared).await);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                (1..=4u64)
                    .map(|n| ledger.enqueue_training_round(round(n, 0.8)).is_ok())
                    .filter(|accepted| *accepted)
                    .count()
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            accepted += handle.await.unwrap();
        }

        assert_eq!(accepted, 4);
        assert!(ledger.flush(Duration::from_secs(5)).await);
        assert_eq!(chain.entries().len(), 4);
        for n in 1..=4 {
            assert_eq!(round_docs(store.as_ref(), n).len(), 1);
        }
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_invalid_rounds_are_rejected_with_wire_strings() {
        let (_store, shared) = store();
        let ledger = AuditLedger::mock(Some(shared), 100);

        let bad_accuracy = enqueue_pair(&ledger.enqueue_training_round(round(1, 1.5)));
        assert_eq!(bad_accuracy, (false, Some("invalid accuracy".to_string())));

        let mut short_hash = round(2, 0.5);
        short_hash.model_hash = "abc".into();
        let bad_hash = enqueue_pair(&ledger.enqueue_training_round(short_hash));
        assert_eq!(bad_hash, (false, Some("invalid model_hash".to_string())));

        // rejected rounds do not reserve their number
        assert!(ledger.enqueue_training_round(round(1, 0.5)).is_ok());
        assert!(ledger.enqueue_training_round(round(2, 0.5)).is_ok());
    }
}
