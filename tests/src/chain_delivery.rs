//! Chain Delivery Tests
//!
//! The background worker against a faulty simulated chain: transient send
//! failures are retried with backoff, reverts are terminal, exhausted rounds
//! are released, and a lost receipt is reconciled against the chain.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use screener_audit::{actions, LedgerMetadata, QueueStats};
    use screener_shared::{collections, DocumentStore, Filter};
    use std::time::Duration;

    const FLUSH: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        chain.fail_next_sends(2);
        ledger.enqueue_training_round(round(1, 0.87)).unwrap();
        assert!(ledger.flush(FLUSH).await);

        assert_eq!(chain.send_attempts(), 3);
        assert_eq!(chain.entries().len(), 1);
        assert_eq!(
            ledger.queue_stats(),
            QueueStats {
                confirmed: 1,
                ..QueueStats::default()
            }
        );
        assert_eq!(store.count_documents(collections::TRAINING_LOGS, &Filter::eq("round", 1)).unwrap(), 1);

        let entry = &ledger.get_audit_logs(10)[0];
        assert_eq!(entry.action, actions::TRAINING_ROUND);
        assert_eq!(entry.metadata["round"], 1);
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_round_is_released() {
        let (store, shared) = store();
        let chain = chain();
        let config = chain_config();
        let ledger = chain_ledger(&config, &chain, shared).await;

        chain.fail_next_sends(config.retry_attempts + 5);
        ledger.enqueue_training_round(round(2, 0.7)).unwrap();
        assert!(ledger.flush(FLUSH).await);

        assert_eq!(chain.send_attempts(), u64::from(config.retry_attempts));
        assert_eq!(ledger.queue_stats().exhausted, 1);
        assert!(chain.entries().is_empty());
        assert_eq!(store.count_documents(collections::TRAINING_LOGS, &Filter::all()).unwrap(), 0);
        assert_eq!(ledger.health_check().logged_rounds_count, 0);

        // the dropped round may be offered again once the chain recovers
        chain.fail_next_sends(0);
        ledger.enqueue_training_round(round(2, 0.7)).unwrap();
        assert!(ledger.flush(FLUSH).await);
        assert_eq!(chain.entries().len(), 1);
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_terminal() {
        let (store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        chain.revert_next_sends(1);
        ledger.enqueue_training_round(round(3, 0.66)).unwrap();
        assert!(ledger.flush(FLUSH).await);

        assert_eq!(chain.send_attempts(), 1);
        assert_eq!(ledger.queue_stats().reverted, 1);
        assert!(chain.entries().is_empty());
        assert_eq!(store.count_documents(collections::TRAINING_LOGS, &Filter::all()).unwrap(), 0);

        // treated as recorded from the producer's side
        assert!(ledger.enqueue_training_round(round(3, 0.66)).unwrap_err().is_duplicate());
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_receipt_is_reconciled_against_chain() {
        let (_store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        chain.withhold_receipts(true);
        ledger.enqueue_training_round(round(4, 0.9)).unwrap();
        assert!(ledger.flush(FLUSH).await);

        // first send landed; the retry found it as the last entry and did not resend
        assert_eq!(chain.send_attempts(), 1);
        assert_eq!(chain.entries().len(), 1);
        assert_eq!(ledger.queue_stats().already_on_chain, 1);
        assert_eq!(ledger.health_check().logged_rounds_count, 1);
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_delivery_and_read_back() {
        let (_store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        let records: Vec<_> = (1..=5).map(|n| round(n, 0.6 + n as f64 * 0.05)).collect();
        for record in &records {
            ledger.enqueue_training_round(record.clone()).unwrap();
        }
        assert!(ledger.flush(FLUSH).await);

        let order: Vec<u64> = chain.entries().iter().map(|e| e.round_number).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);

        let views = ledger.get_logs(1, 2).await;
        assert_eq!(views.iter().map(|v| v.round_number).collect::<Vec<_>>(), vec![2, 3]);
        assert!((views[0].accuracy - 0.7).abs() < 1e-4);

        for (index, record) in records.iter().enumerate() {
            assert!(ledger.verify(index as u64, &LedgerMetadata::from_round(record)).await);
        }
        let tampered = LedgerMetadata {
            accuracy_scaled: 9_999,
            ..LedgerMetadata::from_round(&records[0])
        };
        assert!(!ledger.verify(0, &tampered).await);
        ledger.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_restart_keeps_queue() {
        let (_store, shared) = store();
        let chain = chain();
        let ledger = chain_ledger(&chain_config(), &chain, shared).await;

        ledger.stop(Duration::from_secs(1)).await;
        ledger.enqueue_training_round(round(6, 0.8)).unwrap();
        assert!(!ledger.flush(Duration::from_millis(200)).await);
        assert_eq!(ledger.health_check().queue_size, 1);

        assert!(ledger.start());
        assert!(ledger.flush(FLUSH).await);
        assert_eq!(chain.entries().len(), 1);
        ledger.stop(Duration::from_secs(1)).await;
    }
}
