use crate::common::{
    get_free_port, suite_config, FixedInventory, FixtureDir, MockDocumentServer, ServerLimits,
    LIMIT_ERROR_FRAME,
};
use limitprobe::{ClosureOutcome, LimitProbeSuite, ScenarioKind, ScenarioOutcome};

#[tokio::test]
async fn test_single_document_limit_is_enforced() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 0)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 1, 0),
        server.workers(),
    )
    .unwrap();

    let report = suite.run().await;

    let documents = report.scenario(ScenarioKind::MaxDocuments).unwrap();
    assert!(documents.passed(), "failures: {:?}", documents.failures());
    assert_eq!(documents.closure.as_ref().and_then(|c| c.code()), Some(1008));
    assert_eq!(documents.workers_before, Some(1));
    assert_eq!(documents.workers_after, Some(1));

    let connections = report.scenario(ScenarioKind::MaxConnections).unwrap();
    assert!(matches!(connections.outcome, ScenarioOutcome::Skipped { .. }));
    assert!(report.is_success());
}

#[tokio::test]
async fn test_document_limit_of_three_sends_full_handshake() {
    let server = MockDocumentServer::start(ServerLimits::new(3, 0)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 3, 0),
        server.workers(),
    )
    .unwrap();

    let (report, baseline) = suite.run_scenario(ScenarioKind::MaxDocuments, 1).await;
    assert!(report.passed(), "failures: {:?}", report.failures());
    assert_eq!(baseline, 1);

    match report.closure.as_ref().unwrap() {
        ClosureOutcome::Closed {
            code,
            message,
            errors,
        } => {
            assert_eq!(*code, Some(1008));
            assert_eq!(message, "Server limit reached");
            assert_eq!(errors, &vec![LIMIT_ERROR_FRAME.to_string()]);
        }
        other => panic!("expected a close, got {other}"),
    }

    let rejected = server.rejected_handshakes();
    assert_eq!(rejected.len(), 1);
    let frames = &rejected[0];
    assert_eq!(frames.len(), 3);
    assert!(frames[0].starts_with("loolclient "));
    assert!(frames[1].starts_with("load url=file://"));
    assert!(frames[2].starts_with("partpagerectangles"));

    assert_eq!(server.accepted_connections(), 4);
    assert_eq!(fixtures.leftover_copies(), 0);
}

#[tokio::test]
async fn test_connection_limit_is_enforced() {
    let server = MockDocumentServer::start(ServerLimits::new(0, 2)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 0, 2),
        server.workers(),
    )
    .unwrap();

    let report = suite.run_only(&[ScenarioKind::MaxConnections]).await;

    assert_eq!(report.scenarios.len(), 1);
    let connections = &report.scenarios[0];
    assert!(connections.passed(), "failures: {:?}", connections.failures());
    assert!(connections.closure.as_ref().unwrap().is_policy_violation());
    assert_eq!(server.accepted_connections(), 3);
    assert_eq!(server.open_documents(), 0);
}

#[tokio::test]
async fn test_both_scenarios_share_the_baseline() {
    let server = MockDocumentServer::start(ServerLimits::new(2, 3)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 2, 3),
        server.workers(),
    )
    .unwrap();

    let report = suite.run().await;

    assert!(report.is_success(), "{:?}", report.scenarios);
    assert_eq!(report.passed_count(), 2);
    for scenario in &report.scenarios {
        assert_eq!(scenario.workers_before, Some(1));
        assert_eq!(scenario.workers_after, Some(1));
    }
    assert_eq!(fixtures.leftover_copies(), 0);
}

#[tokio::test]
async fn test_disabled_limits_never_connect() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 1)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 0, 0),
        server.workers(),
    )
    .unwrap();

    let report = suite.run().await;

    assert!(report.is_success());
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(server.accepted_connections(), 0);
}

#[tokio::test]
async fn test_unenforced_limit_fails_with_continued_session() {
    let server = MockDocumentServer::start(ServerLimits::new(5, 0)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 1, 0),
        server.workers(),
    )
    .unwrap();

    let (report, _) = suite.run_scenario(ScenarioKind::MaxDocuments, 1).await;

    assert!(report.failed());
    assert!(matches!(
        report.closure,
        Some(ClosureOutcome::Continued { .. })
    ));
    assert_eq!(report.failures().len(), 1);
    assert!(report.failures()[0].contains("expected 1008"));
    assert_eq!(report.workers_after, Some(1));
}

#[tokio::test]
async fn test_rejection_within_limit_is_reported() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 0)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 2, 0),
        server.workers(),
    )
    .unwrap();

    let (report, _) = suite.run_scenario(ScenarioKind::MaxDocuments, 1).await;

    assert!(report.failed());
    assert!(report.closure.is_none());
    assert!(report.failures()[0].contains("admission of document 2 of 2"));
    assert!(report.failures()[0].contains("1008"));
    assert_eq!(fixtures.leftover_copies(), 0);
}

#[tokio::test]
async fn test_connection_refused_below_the_limit_fails() {
    let server = MockDocumentServer::start(ServerLimits::new(0, 1)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 0, 2),
        server.workers(),
    )
    .unwrap();

    let (report, _) = suite.run_scenario(ScenarioKind::MaxConnections, 1).await;

    assert!(report.failed());
    assert!(report.closure.is_none());
    assert_eq!(
        report.failures(),
        ["assertion failed: admission of connection 2 of 2 (expected an open session, got closed with 1008 (Server limit reached))".to_string()]
    );
    assert_eq!(server.rejected_handshakes(), vec![vec!["loolclient 0.1".to_string()]]);
    assert_eq!(report.workers_after, Some(1));
    assert_eq!(fixtures.leftover_copies(), 0);
}

#[tokio::test]
async fn test_document_refused_below_the_limit_fails_without_preload() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 0)).await;
    let fixtures = FixtureDir::new();
    let mut config = suite_config(&server.base_url, &fixtures, 2, 0);
    config.preload_documents = false;
    let suite = LimitProbeSuite::new(config, server.workers()).unwrap();

    let (report, _) = suite.run_scenario(ScenarioKind::MaxDocuments, 1).await;

    assert!(report.failed());
    assert!(report.closure.is_none());
    assert_eq!(report.failures().len(), 1);
    assert!(report.failures()[0].contains("admission of document 2 of 2"));
    assert!(report.failures()[0].contains("1008"));
    assert_eq!(server.rejected_handshakes().len(), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_failure() {
    let fixtures = FixtureDir::new();
    let uri = format!("http://127.0.0.1:{}", get_free_port());
    let suite =
        LimitProbeSuite::new(suite_config(&uri, &fixtures, 1, 1), FixedInventory(1)).unwrap();

    let report = suite.run().await;

    assert_eq!(report.failed_count(), 2);
    for scenario in &report.scenarios {
        assert!(scenario.closure.is_none());
        assert!(scenario.failures()[0].starts_with("transport error while opening session"));
        assert_eq!(scenario.workers_after, Some(1));
    }
}

#[tokio::test]
async fn test_leaked_worker_fails_the_scenario() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 0).leaking()).await;
    let fixtures = FixtureDir::new();
    let mut config = suite_config(&server.base_url, &fixtures, 1, 0);
    config.settle.attempts = 3;
    let suite = LimitProbeSuite::new(config, server.workers()).unwrap();

    let (report, _) = suite.run_scenario(ScenarioKind::MaxDocuments, 1).await;

    assert!(report.failed());
    assert!(report.closure.as_ref().unwrap().is_policy_violation());
    assert_eq!(report.workers_after, Some(2));
    assert_eq!(
        report.failures(),
        ["assertion failed: worker processes after the scenario (expected 1, got 2)".to_string()]
    );
}

#[tokio::test]
async fn test_missing_workers_fail_before_connecting() {
    let server = MockDocumentServer::start(ServerLimits::new(1, 1)).await;
    let fixtures = FixtureDir::new();
    let suite = LimitProbeSuite::new(
        suite_config(&server.base_url, &fixtures, 1, 1),
        FixedInventory(0),
    )
    .unwrap();

    let report = suite.run().await;

    assert_eq!(report.failed_count(), 2);
    assert_eq!(server.accepted_connections(), 0);
}

#[tokio::test]
async fn test_probe_without_preload() {
    let server = MockDocumentServer::start(ServerLimits::new(2, 2)).await;
    let fixtures = FixtureDir::new();
    let mut config = suite_config(&server.base_url, &fixtures, 2, 2);
    config.preload_documents = false;
    let suite = LimitProbeSuite::new(config, server.workers()).unwrap();

    let report = suite.run().await;

    assert!(report.is_success(), "{:?}", report.scenarios);
}
