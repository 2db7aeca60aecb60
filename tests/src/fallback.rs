//! Fallback Transparency Tests
//!
//! The same sequence of service calls against a chain-backed ledger and the
//! mock fallback: callers observe the same rounds, metrics and audit actions.
//! Only health reporting tells the two apart.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use screener_audit::{actions, ChainRpc, LedgerConfig};
    use screener_service::{ScreenerService, ScreeningRequest, ServiceConfig, ServiceError, SimulatedEvaluator};
    use screener_shared::{collections, DocumentStore, Filter};
    use std::sync::Arc;
    use std::time::Duration;

    const ROUNDS: u64 = 4;

    struct Observed {
        rounds: Vec<u64>,
        accuracies: Vec<f64>,
        persisted_rounds: usize,
        actions: Vec<String>,
        eligible_count: usize,
        is_mock: bool,
        contract_address: Option<String>,
    }

    async fn service(ledger: LedgerConfig, rpc: Option<Arc<dyn ChainRpc>>) -> (ScreenerService, Arc<dyn DocumentStore>) {
        let (store, shared) = store();
        store.seed(collections::PATIENTS, &population(300, 77)).unwrap();
        let config = ServiceConfig {
            ledger,
            round_interval_ms: 100,
            ..ServiceConfig::default()
        };
        let service = ScreenerService::connect(config, shared.clone(), rpc, Arc::new(SimulatedEvaluator::seeded(3)))
            .await
            .unwrap();
        (service, shared)
    }

    async fn drive(service: &ScreenerService, store: &Arc<dyn DocumentStore>) -> Observed {
        service.startup();
        service.login("alice", "St. Mary");
        let screening = service
            .eligible_patients_for_drug(&ScreeningRequest::new("Metformin-XL"))
            .unwrap();

        service.start_training(ROUNDS).unwrap();
        service.training().wait().await;
        assert!(service.ledger().flush(Duration::from_secs(30)).await);

        let views = service.training_logs(0, ROUNDS).await;
        let mut logged: Vec<String> = service.audit_logs(None).into_iter().map(|e| e.action).collect();
        logged.sort();
        let health = service.health();
        let observed = Observed {
            rounds: views.iter().map(|v| v.round_number).collect(),
            accuracies: views.iter().map(|v| v.accuracy).collect(),
            persisted_rounds: store.count_documents(collections::TRAINING_LOGS, &Filter::all()).unwrap() as usize,
            actions: logged,
            eligible_count: screening.page.eligible_count,
            is_mock: health.ledger.is_mock,
            contract_address: health.ledger.contract_address,
        };
        service.shutdown(Duration::from_secs(5)).await;
        observed
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_and_chain_observe_the_same_session() {
        let (mock_service, mock_store) = service(LedgerConfig::default(), None).await;
        let mock = drive(&mock_service, &mock_store).await;

        let chain = chain();
        let rpc = chain.clone() as Arc<dyn ChainRpc>;
        let (chain_service, chain_store) = service(chain_config(), Some(rpc)).await;
        let onchain = drive(&chain_service, &chain_store).await;

        assert_eq!(mock.rounds, vec![1, 2, 3, 4]);
        assert_eq!(mock.rounds, onchain.rounds);
        for (a, b) in mock.accuracies.iter().zip(&onchain.accuracies) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
        assert_eq!(mock.persisted_rounds, ROUNDS as usize);
        assert_eq!(onchain.persisted_rounds, ROUNDS as usize);
        assert_eq!(mock.actions, onchain.actions);
        assert_eq!(
            mock.actions.iter().filter(|a| a.as_str() == actions::TRAINING_ROUND).count(),
            ROUNDS as usize
        );
        assert_eq!(mock.eligible_count, onchain.eligible_count);
        assert_eq!(chain.entries().len(), ROUNDS as usize);

        // health is the only place the backing differs
        assert!(mock.is_mock);
        assert!(!onchain.is_mock);
        assert_eq!(mock.contract_address, None);
        assert_eq!(onchain.contract_address.as_deref(), Some(CONTRACT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_node_falls_back_to_mock() {
        let chain = chain();
        chain.set_connected(false);
        let rpc = chain.clone() as Arc<dyn ChainRpc>;
        let (service, store) = service(chain_config(), Some(rpc)).await;
        assert!(service.ledger().is_mock());

        let observed = drive(&service, &store).await;
        assert_eq!(observed.rounds, vec![1, 2, 3, 4]);
        assert!(chain.entries().is_empty());
        assert_eq!(chain.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_strict_mode_refuses_fallback() {
        let (_store, shared) = store();
        let ledger = LedgerConfig {
            strict: true,
            ..LedgerConfig::default()
        };
        let config = ServiceConfig {
            ledger,
            ..ServiceConfig::default()
        };
        let err = ScreenerService::connect(config, shared, None, Arc::new(SimulatedEvaluator::seeded(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Ledger(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_rounds_are_refused_on_both_backings() {
        let chain = chain();
        let rpc = chain.clone() as Arc<dyn ChainRpc>;
        let (chain_service, chain_store) = service(chain_config(), Some(rpc)).await;
        let (mock_service, mock_store) = service(LedgerConfig::default(), None).await;

        for (screener, store) in [(&chain_service, &chain_store), (&mock_service, &mock_store)] {
            screener.start_training(2).unwrap();
            screener.training().wait().await;
            assert!(screener.ledger().flush(Duration::from_secs(30)).await);

            // the registry outlives the session: a second run cannot reuse round numbers
            screener.start_training(2).unwrap();
            screener.training().wait().await;
            assert!(screener.ledger().flush(Duration::from_secs(30)).await);

            assert_eq!(screener.training_status().rounds_completed, 2);
            assert_eq!(screener.ledger().health_check().logged_rounds_count, 2);
            // the rerun still leaves its own rounds in training_logs
            assert_eq!(store.count_documents(collections::TRAINING_LOGS, &Filter::all()).unwrap(), 2);
            screener.shutdown(Duration::from_secs(5)).await;
        }
        assert_eq!(chain.entries().len(), 2);
    }
}
