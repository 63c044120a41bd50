//! Scenario tests for the collection engine
//!
//! The first group drives the engine through a real [`KomodoClient`] against a
//! mock `/read` endpoint. The second group uses an in-process [`FleetApi`]
//! double to observe concurrency and cancellation behaviour.

mod fake_komodo_tests {
    use crate::client::{ClientOptions, KomodoClient};
    use crate::collector::{Collector, CollectorBuilder};
    use crate::context::ScrapeContext;
    use crate::models::StatRecord;
    use mockito::{Matcher, Mock, ServerGuard};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn server_entry(id: &str, name: &str, state: &str) -> Value {
        json!({"id": id, "name": name, "info": {"state": state}})
    }

    async fn mock_list(server: &mut ServerGuard, servers: Vec<Value>) -> Mock {
        server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(json!({"type": "ListServers"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(Value::Array(servers).to_string())
            .create_async()
            .await
    }

    async fn mock_stats(server: &mut ServerGuard, id: &str, stats: Value) -> Mock {
        server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(
                json!({"type": "GetSystemStats", "params": {"server": id}}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(stats.to_string())
            .create_async()
            .await
    }

    async fn mock_stats_failure(server: &mut ServerGuard, id: &str) -> Mock {
        server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(
                json!({"type": "GetSystemStats", "params": {"server": id}}),
            ))
            .with_status(500)
            .with_body(r#"{"error":"server stats not available"}"#)
            .create_async()
            .await
    }

    fn collector_for(url: &str) -> Collector {
        let client =
            KomodoClient::new(url, "test-key", "test-secret", ClientOptions::default()).unwrap();
        CollectorBuilder::new().api(Arc::new(client)).build().unwrap()
    }

    fn by_id(records: &[StatRecord]) -> HashMap<&str, &StatRecord> {
        records.iter().map(|r| (r.server_id.as_str(), r)).collect()
    }

    #[tokio::test]
    async fn test_all_servers_healthy() {
        let mut server = mockito::Server::new_async().await;
        let _list = mock_list(
            &mut server,
            vec![
                server_entry("aaa", "server-a", "Ok"),
                server_entry("bbb", "server-b", "Ok"),
            ],
        )
        .await;
        let _a = mock_stats(
            &mut server,
            "aaa",
            json!({
                "cpu_perc": 10.0, "mem_used_gb": 1.0, "mem_free_gb": 3.0, "mem_total_gb": 4.0,
                "network_ingress_bytes": 512.0, "network_egress_bytes": 256.0, "refresh_ts": 1700000001
            }),
        )
        .await;
        let _b = mock_stats(
            &mut server,
            "bbb",
            json!({"cpu_perc": 20.0, "mem_used_gb": 2.0, "mem_free_gb": 2.0, "mem_total_gb": 4.0}),
        )
        .await;

        let collection = collector_for(&server.url())
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 2);
        assert_eq!(collection.error_count(), 0);

        let records = by_id(&collection.records);
        let a = records["aaa"];
        assert_eq!(a.server_name, "server-a");
        assert_eq!(a.stats.cpu_percent, 10.0);
        assert_eq!(a.stats.mem_used_gb, 1.0);
        assert_eq!(a.stats.mem_free_gb, 3.0);
        assert_eq!(a.stats.mem_total_gb, 4.0);
        assert_eq!(a.stats.net_ingress_bytes, 512.0);
        assert_eq!(a.stats.net_egress_bytes, 256.0);
        assert_eq!(a.stats.refresh_timestamp, 1_700_000_001);
        assert_eq!(records["bbb"].stats.cpu_percent, 20.0);
    }

    #[tokio::test]
    async fn test_one_server_down_is_absorbed() {
        let mut server = mockito::Server::new_async().await;
        let _list = mock_list(
            &mut server,
            vec![
                server_entry("aaa", "server-a", "Ok"),
                server_entry("bbb", "server-b", "Ok"),
                server_entry("ccc", "server-c", "Ok"),
            ],
        )
        .await;
        let _a = mock_stats(&mut server, "aaa", json!({"cpu_perc": 10.0})).await;
        let _b = mock_stats_failure(&mut server, "bbb").await;
        let _c = mock_stats(&mut server, "ccc", json!({"cpu_perc": 30.0})).await;

        let collection = collector_for(&server.url())
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 2);
        let records = by_id(&collection.records);
        assert!(records.contains_key("aaa"));
        assert!(records.contains_key("ccc"));
        assert!(!records.contains_key("bbb"));

        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].server_id, "bbb");
        assert_eq!(collection.failures[0].server_name, "server-b");
    }

    #[tokio::test]
    async fn test_all_servers_down_returns_empty() {
        let mut server = mockito::Server::new_async().await;
        let _list = mock_list(
            &mut server,
            vec![
                server_entry("aaa", "server-a", "Ok"),
                server_entry("bbb", "server-b", "Ok"),
            ],
        )
        .await;
        let _a = mock_stats_failure(&mut server, "aaa").await;
        let _b = mock_stats_failure(&mut server, "bbb").await;

        let collection = collector_for(&server.url())
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert!(collection.records.is_empty());
        assert_eq!(collection.error_count(), 2);
    }

    #[tokio::test]
    async fn test_list_servers_failure_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(json!({"type": "ListServers"})))
            .with_status(500)
            .with_body(r#"{"error":"core unavailable"}"#)
            .create_async()
            .await;
        let stats = server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(json!({"type": "GetSystemStats"})))
            .expect(0)
            .create_async()
            .await;

        let result = collector_for(&server.url())
            .collect(&ScrapeContext::background())
            .await;

        assert!(result.is_err());
        stats.assert_async().await;
    }

    #[tokio::test]
    async fn test_pre_cancelled_context_fails_without_requests() {
        let mut server = mockito::Server::new_async().await;
        let any = server
            .mock("POST", "/read")
            .with_status(200)
            .with_body("[]")
            .expect(0)
            .create_async()
            .await;

        let (ctx, handle) = ScrapeContext::cancellable();
        handle.cancel();

        let result = collector_for(&server.url()).collect(&ctx).await;

        assert!(result.is_err());
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_servers_returns_empty() {
        let mut server = mockito::Server::new_async().await;
        let _list = mock_list(&mut server, vec![]).await;
        let stats = server
            .mock("POST", "/read")
            .match_body(Matcher::PartialJson(json!({"type": "GetSystemStats"})))
            .expect(0)
            .create_async()
            .await;

        let collection = collector_for(&server.url())
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert!(collection.records.is_empty());
        assert_eq!(collection.error_count(), 0);
        stats.assert_async().await;
    }

    #[tokio::test]
    async fn test_only_ok_skips_unhealthy_servers() {
        let mut server = mockito::Server::new_async().await;
        let _list = mock_list(
            &mut server,
            vec![
                server_entry("aaa", "server-a", "Ok"),
                server_entry("bbb", "server-b", "NotOk"),
                server_entry("ccc", "server-c", "Disabled"),
            ],
        )
        .await;
        let _a = mock_stats(&mut server, "aaa", json!({"cpu_perc": 10.0})).await;
        let skipped = server
            .mock("POST", "/read")
            .match_body(Matcher::AnyOf(vec![
                Matcher::PartialJson(json!({"params": {"server": "bbb"}})),
                Matcher::PartialJson(json!({"params": {"server": "ccc"}})),
            ]))
            .expect(0)
            .create_async()
            .await;

        let client = KomodoClient::new(
            &server.url(),
            "test-key",
            "test-secret",
            ClientOptions::default(),
        )
        .unwrap();
        let collector = CollectorBuilder::new()
            .api(Arc::new(client))
            .only_ok(true)
            .build()
            .unwrap();

        let collection = collector
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 1);
        assert_eq!(collection.records[0].server_id, "aaa");
        skipped.assert_async().await;
    }
}

mod fleet_double_tests {
    use crate::client::{async_trait, ClientError, FleetApi};
    use crate::collector::engine::fetch_server;
    use crate::collector::{CollectorBuilder, DEFAULT_MAX_CONCURRENT};
    use crate::context::ScrapeContext;
    use crate::models::{ServerDescriptor, ServerState, ServerStats};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Fleet double that records how many stat calls overlap
    struct SlowFleet {
        servers: Vec<ServerDescriptor>,
        failing: HashSet<String>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowFleet {
        fn new(count: usize, delay: Duration) -> Self {
            let servers = (0..count)
                .map(|i| {
                    ServerDescriptor::new(format!("srv-{i}"), format!("server-{i}"), ServerState::Ok)
                })
                .collect();

            Self {
                servers,
                failing: HashSet::new(),
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, ids: &[&str]) -> Self {
            self.failing = ids.iter().map(|id| id.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl FleetApi for SlowFleet {
        async fn list_servers(
            &self,
            ctx: &ScrapeContext,
        ) -> Result<Vec<ServerDescriptor>, ClientError> {
            ctx.guard(async { Ok(self.servers.clone()) }).await
        }

        async fn get_stats(
            &self,
            ctx: &ScrapeContext,
            server_id: &str,
        ) -> Result<ServerStats, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let result = ctx
                .guard(async {
                    tokio::time::sleep(self.delay).await;
                    if self.failing.contains(server_id) {
                        return Err(ClientError::Protocol {
                            status: 500,
                            body: "unavailable".to_string(),
                        });
                    }
                    Ok(ServerStats {
                        cpu_percent: 42.0,
                        ..Default::default()
                    })
                })
                .await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound_is_respected() {
        let fleet = Arc::new(SlowFleet::new(20, Duration::from_millis(20)));
        let collector = CollectorBuilder::new()
            .api(fleet.clone())
            .max_concurrent(3)
            .build()
            .unwrap();

        let collection = collector
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 20);
        assert_eq!(fleet.calls.load(Ordering::SeqCst), 20);
        let max = fleet.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {max} concurrent fetches with a limit of 3");
        assert!(max >= 2, "fetches never overlapped");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_limit_falls_back_to_default() {
        let fleet = Arc::new(SlowFleet::new(30, Duration::from_millis(20)));
        let collector = CollectorBuilder::new()
            .api(fleet.clone())
            .max_concurrent(0)
            .build()
            .unwrap();

        collector
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert!(fleet.max_in_flight.load(Ordering::SeqCst) <= DEFAULT_MAX_CONCURRENT);
    }

    #[tokio::test]
    async fn test_k_of_n_failures_are_absorbed() {
        let fleet = Arc::new(SlowFleet::new(5, Duration::from_millis(1)).failing(&["srv-1", "srv-3"]));
        let collector = CollectorBuilder::new().api(fleet).build().unwrap();

        let collection = collector
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 3);
        let ids: HashSet<_> = collection.records.iter().map(|r| r.server_id.as_str()).collect();
        assert!(!ids.contains("srv-1"));
        assert!(!ids.contains("srv-3"));

        let failed: HashSet<_> = collection.failures.iter().map(|f| f.server_id.as_str()).collect();
        assert_eq!(failed, HashSet::from(["srv-1", "srv-3"]));
    }

    #[tokio::test]
    async fn test_deadline_during_fetches_degrades_to_failures() {
        let fleet = Arc::new(SlowFleet::new(4, Duration::from_secs(10)));
        let collector = CollectorBuilder::new().api(fleet).build().unwrap();

        let ctx = ScrapeContext::background().with_timeout(Duration::from_millis(50));
        let collection = collector.collect(&ctx).await.unwrap();

        assert!(collection.records.is_empty());
        assert_eq!(collection.failures.len(), 4);
        assert!(collection.failures.iter().all(|f| f.error.is_context_error()));
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_fetched_once() {
        let mut fleet = SlowFleet::new(2, Duration::from_millis(1));
        fleet
            .servers
            .push(ServerDescriptor::new("srv-0", "server-0-again", ServerState::Ok));
        let fleet = Arc::new(fleet);
        let collector = CollectorBuilder::new().api(fleet.clone()).build().unwrap();

        let collection = collector
            .collect(&ScrapeContext::background())
            .await
            .unwrap();

        assert_eq!(collection.records.len(), 2);
        assert_eq!(fleet.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_gate_fails_fetch_without_calling_api() {
        let fleet = Arc::new(SlowFleet::new(1, Duration::from_millis(1)));
        let gate = Arc::new(Semaphore::new(1));
        gate.close();

        let server = fleet.servers[0].clone();
        let failure = fetch_server(fleet.clone(), gate, ScrapeContext::background(), server)
            .await
            .unwrap_err();

        assert_eq!(failure.server_id, "srv-0");
        assert!(matches!(failure.error, ClientError::Cancelled));
        assert_eq!(fleet.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_builder_requires_api() {
        assert!(CollectorBuilder::new().max_concurrent(4).build().is_err());
    }
}
