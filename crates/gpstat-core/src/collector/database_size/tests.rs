use std::time::Duration;

use super::queries::{BLOAT_TABLES, DATABASE_SIZE, HIT_CACHE_RATE, TABLE_COUNT, TX_COMMIT_RATE};
use super::*;
use crate::collector::metrics::{
    BLOAT_TABLE, DATABASE_SIZE as SIZE_DESC, HIT_CACHE_RATE as HIT_DESC, TABLE_COUNT as COUNT_DESC,
    TX_COMMIT_RATE as COMMIT_DESC,
};
use crate::collector::mock::{MockCluster, MockConnection, MockConnector, row, text_row};

fn scrape(
    primary: &mut MockConnection,
    connector: MockConnector,
) -> (Vec<Measurement>, Result<(), ScrapeError>, MockConnector) {
    let scraper = DatabaseSizeScraper::new(MockCluster::config(), connector);
    let mut sink: Vec<Measurement> = Vec::new();
    let result = scraper.scrape(primary, &mut sink, 90424);
    (sink, result, scraper.connector)
}

fn values_of(sink: &[Measurement], desc: &MetricDesc) -> Vec<(Vec<String>, f64)> {
    sink.iter()
        .filter(|m| m.desc == desc)
        .map(|m| (m.labels.clone(), m.value))
        .collect()
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn typical_cluster_emits_expected_set() {
    let (mut primary, connector) = MockCluster::typical();
    let (sink, result, _) = scrape(&mut primary, connector);

    assert!(result.is_ok(), "unexpected error: {:?}", result);
    assert_eq!(sink.len(), 7);

    assert_eq!(
        values_of(&sink, &SIZE_DESC),
        vec![(labels(&["app"]), 100.5), (labels(&["sales"]), 42.0)]
    );
    assert_eq!(
        values_of(&sink, &COUNT_DESC),
        vec![(labels(&["app"]), 10.0), (labels(&["sales"]), 3.0)]
    );
    assert_eq!(
        values_of(&sink, &BLOAT_TABLE),
        vec![(labels(&["sales", "public", "orders", "1200", "100"]), 2.0)]
    );
    assert_eq!(values_of(&sink, &HIT_DESC), vec![(Vec::new(), 97.2)]);
    assert_eq!(values_of(&sink, &COMMIT_DESC), vec![(Vec::new(), 99.9)]);
}

#[test]
fn measurements_follow_discovery_order() {
    let (mut primary, connector) = MockCluster::typical();
    let (sink, _, _) = scrape(&mut primary, connector);

    let order: Vec<(&str, Option<&str>)> = sink
        .iter()
        .map(|m| (m.desc.name, m.labels.first().map(String::as_str)))
        .collect();
    assert_eq!(
        order,
        vec![
            ("database_name_mb_size", Some("app")),
            ("database_name_mb_size", Some("sales")),
            ("database_table_total_count", Some("app")),
            ("database_table_bloat_list", Some("sales")),
            ("database_table_total_count", Some("sales")),
            ("database_hit_cache_percent_rate", None),
            ("database_transition_commit_percent_rate", None),
        ]
    );
}

#[test]
fn one_size_measurement_per_database() {
    let names: Vec<String> = (0..25).map(|i| format!("db{i:02}")).collect();
    let mut primary = MockConnection::new("postgres")
        .with_rows(
            &DATABASE_SIZE,
            names
                .iter()
                .map(|n| text_row(&[n.as_str(), "1"]))
                .collect(),
        )
        .with_rows(&HIT_CACHE_RATE, vec![text_row(&["50"])])
        .with_rows(&TX_COMMIT_RATE, vec![text_row(&["50"])]);
    let mut connector = MockConnector::new();
    for n in &names {
        connector = connector.with_database(
            MockConnection::new(n.as_str())
                .with_rows(&TABLE_COUNT, vec![text_row(&["0"])])
                .with_rows(&BLOAT_TABLES, Vec::new()),
        );
    }

    let (sink, result, _) = scrape(&mut primary, connector);
    assert!(result.is_ok());
    let sizes = values_of(&sink, &SIZE_DESC);
    assert_eq!(sizes.len(), names.len());
    for ((lbls, _), name) in sizes.iter().zip(&names) {
        assert_eq!(lbls, &vec![name.clone()]);
    }
}

#[test]
fn primary_timeout_emits_nothing() {
    let (primary, connector) = MockCluster::typical();
    let mut primary = primary.with_delay(
        &DATABASE_SIZE,
        Duration::from_secs(30),
        vec![text_row(&["app", "1"])],
    );

    let (sink, result, connector) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.failure_count(), 1);
    assert!(sink.is_empty());
    assert!(connector.stats().connect_attempts.is_empty());

    // the enumeration query ran with the 2s deadline, nothing ran after it
    let executed = primary.stats().executed;
    assert_eq!(
        executed,
        vec![(
            "postgres".to_string(),
            "database_size",
            Some(Duration::from_secs(2))
        )]
    );
}

#[test]
fn primary_query_failure_stops_cycle() {
    let (primary, connector) = MockCluster::typical();
    let mut primary = primary.with_error(&DATABASE_SIZE, "relation does not exist");

    let (sink, result, connector) = scrape(&mut primary, connector);

    assert!(matches!(
        result,
        Err(ScrapeError::Query {
            query: "database_size",
            ..
        })
    ));
    assert!(sink.is_empty());
    assert!(connector.stats().opened.is_empty());
}

#[test]
fn unscannable_size_rows_are_skipped() {
    let (primary, connector) = MockCluster::typical();
    let mut primary = primary.with_rows(
        &DATABASE_SIZE,
        vec![
            text_row(&["app", "100.5"]),
            row(&[None, Some("7")]),
            text_row(&["broken", "lots"]),
            text_row(&["sales", "42.0"]),
        ],
    );

    let (sink, result, connector) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert_eq!(err.failure_count(), 2);
    assert_eq!(values_of(&sink, &SIZE_DESC).len(), 2);
    // skipped rows are never visited in the per-database stage
    assert_eq!(connector.stats().opened, vec!["app", "sales"]);
}

#[test]
fn one_refused_connection_does_not_block_others() {
    let (mut primary, connector) = MockCluster::three_databases();
    let connector = connector.refuse("hr", "connection refused");

    let (sink, result, connector) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert_eq!(err.failure_count(), 1);
    assert_eq!(
        err.to_string(),
        "database \"hr\": connection failed: connection refused"
    );
    assert_eq!(connector.stats().opened, vec!["app", "sales"]);
    assert!(connector.stats().leaked.is_empty());

    assert_eq!(
        values_of(&sink, &COUNT_DESC),
        vec![(labels(&["app"]), 1.0), (labels(&["sales"]), 3.0)]
    );
    let bloat: Vec<_> = values_of(&sink, &BLOAT_TABLE)
        .into_iter()
        .map(|(l, v)| (l[0].clone(), v))
        .collect();
    assert_eq!(bloat, vec![("app".to_string(), 0.0), ("sales".to_string(), 2.0)]);
    assert_eq!(values_of(&sink, &SIZE_DESC).len(), 3);
    assert_eq!(values_of(&sink, &HIT_DESC).len(), 1);
    assert_eq!(values_of(&sink, &COMMIT_DESC).len(), 1);
}

#[test]
fn severity_tiers_follow_diagnostic_text() {
    let (mut primary, connector) = MockCluster::three_databases();
    let (sink, result, _) = scrape(&mut primary, connector);

    assert!(result.is_ok());
    let tiers: Vec<f64> = values_of(&sink, &BLOAT_TABLE)
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(tiers, vec![0.0, 1.0, 2.0]);
}

#[test]
fn missing_diagnostic_is_tier_zero() {
    let (mut primary, _) = MockCluster::typical();
    let connector = MockConnector::new()
        .with_database(
            MockConnection::new("app")
                .with_rows(&TABLE_COUNT, vec![text_row(&["1"])])
                .with_rows(
                    &BLOAT_TABLES,
                    vec![
                        row(&[Some("app"), Some("s"), Some("t1"), Some("9"), Some("1"), None]),
                        text_row(&["app", "s", "t2", "9", "1"]),
                    ],
                ),
        )
        .with_database(
            MockConnection::new("sales")
                .with_rows(&TABLE_COUNT, vec![text_row(&["1"])])
                .with_rows(&BLOAT_TABLES, Vec::new()),
        );

    let (sink, result, _) = scrape(&mut primary, connector);
    assert!(result.is_ok());
    assert_eq!(
        values_of(&sink, &BLOAT_TABLE)
            .into_iter()
            .map(|(_, v)| v)
            .collect::<Vec<_>>(),
        vec![0.0, 0.0]
    );
}

#[test]
fn bad_bloat_row_is_skipped_siblings_kept() {
    let (mut primary, _) = MockCluster::typical();
    let connector = MockConnector::new()
        .with_database(
            MockConnection::new("app")
                .with_rows(&TABLE_COUNT, vec![text_row(&["4"])])
                .with_rows(
                    &BLOAT_TABLES,
                    vec![
                        row(&[Some("app"), None, Some("t1"), Some("9"), Some("1"), None]),
                        text_row(&["app", "s", "t2", "9", "1", "moderate amount of bloat suspected"]),
                    ],
                ),
        )
        .with_database(
            MockConnection::new("sales")
                .with_rows(&TABLE_COUNT, vec![text_row(&["1"])])
                .with_rows(&BLOAT_TABLES, Vec::new()),
        );

    let (sink, result, _) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert_eq!(err.failure_count(), 1);
    assert!(err.to_string().starts_with("database \"app\": scan of column 1"));
    assert_eq!(values_of(&sink, &BLOAT_TABLE).len(), 1);
    assert_eq!(
        values_of(&sink, &COUNT_DESC),
        vec![(labels(&["app"]), 4.0), (labels(&["sales"]), 1.0)]
    );
}

#[test]
fn count_failure_does_not_skip_bloat() {
    let (mut primary, _) = MockCluster::typical();
    let connector = MockConnector::new()
        .with_database(
            MockConnection::new("app")
                .with_error(&TABLE_COUNT, "permission denied")
                .with_rows(
                    &BLOAT_TABLES,
                    vec![text_row(&["app", "s", "t", "9", "1", "significant"])],
                ),
        )
        .with_database(
            MockConnection::new("sales")
                .with_rows(&TABLE_COUNT, vec![text_row(&["not a number"])])
                .with_rows(&BLOAT_TABLES, Vec::new()),
        );

    let (sink, result, _) = scrape(&mut primary, connector);

    assert_eq!(result.unwrap_err().failure_count(), 2);
    assert!(values_of(&sink, &COUNT_DESC).is_empty());
    assert_eq!(values_of(&sink, &BLOAT_TABLE).len(), 1);
}

#[test]
fn bloat_failure_keeps_count() {
    let (mut primary, _) = MockCluster::typical();
    let connector = MockConnector::new()
        .with_database(
            MockConnection::new("app")
                .with_rows(&TABLE_COUNT, vec![text_row(&["10"])])
                .with_error(&BLOAT_TABLES, "gp_toolkit missing"),
        )
        .with_database(
            MockConnection::new("sales")
                .with_rows(&TABLE_COUNT, vec![text_row(&["3"])])
                .with_rows(&BLOAT_TABLES, Vec::new()),
        );

    let (sink, result, _) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert_eq!(err.failure_count(), 1);
    assert!(err.to_string().contains("bloat_tables"));
    assert_eq!(values_of(&sink, &COUNT_DESC).len(), 2);
}

#[test]
fn every_opened_connection_closed_exactly_once() {
    let (primary, _) = MockCluster::typical();
    let connector = MockConnector::new()
        // both queries succeed
        .with_database(
            MockConnection::new("ok")
                .with_rows(&TABLE_COUNT, vec![text_row(&["1"])])
                .with_rows(&BLOAT_TABLES, vec![text_row(&["ok", "s", "t", "1", "1", "x"])]),
        )
        // both queries fail
        .with_database(MockConnection::new("failing"))
        // zero rows everywhere
        .with_database(
            MockConnection::new("empty")
                .with_rows(&TABLE_COUNT, Vec::new())
                .with_rows(&BLOAT_TABLES, Vec::new()),
        )
        .refuse("down", "connection refused");
    let mut primary = primary.with_rows(
        &DATABASE_SIZE,
        vec![
            text_row(&["ok", "1"]),
            text_row(&["failing", "1"]),
            text_row(&["empty", "1"]),
            text_row(&["down", "1"]),
        ],
    );

    let (_, result, connector) = scrape(&mut primary, connector);

    // failing: 2 query errors, empty: no rows for count, down: connect
    assert_eq!(result.unwrap_err().failure_count(), 4);

    let stats = connector.stats();
    assert_eq!(stats.opened, vec!["ok", "failing", "empty"]);
    let mut closed = stats.closed.clone();
    closed.sort();
    let mut opened = stats.opened.clone();
    opened.sort();
    assert_eq!(closed, opened);
    assert!(stats.leaked.is_empty());
}

#[test]
fn ratio_failures_are_independent() {
    let (primary, connector) = MockCluster::typical();
    let mut primary = primary.with_error(&HIT_CACHE_RATE, "division by zero");

    let (sink, result, _) = scrape(&mut primary, connector);

    let err = result.unwrap_err();
    assert_eq!(err.failure_count(), 1);
    assert!(err.to_string().contains("hit_cache_rate"));
    assert!(values_of(&sink, &HIT_DESC).is_empty());
    assert_eq!(values_of(&sink, &COMMIT_DESC), vec![(Vec::new(), 99.9)]);

    let (primary, connector) = MockCluster::typical();
    let mut primary = primary.with_error(&TX_COMMIT_RATE, "boom");
    let (sink, result, _) = scrape(&mut primary, connector);
    assert_eq!(result.unwrap_err().failure_count(), 1);
    assert_eq!(values_of(&sink, &HIT_DESC), vec![(Vec::new(), 97.2)]);
    assert!(values_of(&sink, &COMMIT_DESC).is_empty());
}

#[test]
fn ratio_reads_first_row_only_and_skips_null() {
    let (primary, connector) = MockCluster::typical();
    let mut primary = primary
        .with_rows(
            &HIT_CACHE_RATE,
            vec![text_row(&["88.5"]), text_row(&["1.0"])],
        )
        .with_rows(&TX_COMMIT_RATE, vec![row(&[None])]);

    let (sink, result, _) = scrape(&mut primary, connector);

    assert!(result.is_ok());
    assert_eq!(values_of(&sink, &HIT_DESC), vec![(Vec::new(), 88.5)]);
    assert!(values_of(&sink, &COMMIT_DESC).is_empty());
}

#[test]
fn target_deadline_applies_to_per_database_and_ratio_queries() {
    let (mut primary, connector) = MockCluster::typical();
    let config = MockCluster::config().with_target_deadline(Some(Duration::from_secs(5)));
    let scraper = DatabaseSizeScraper::new(config, connector);
    let mut sink: Vec<Measurement> = Vec::new();
    scraper.scrape(&mut primary, &mut sink, 0).unwrap();

    let primary_log = primary.stats().executed;
    assert_eq!(primary_log[0].2, Some(Duration::from_secs(2)));
    assert!(primary_log[1..]
        .iter()
        .all(|(_, _, d)| *d == Some(Duration::from_secs(5))));
    assert!(scraper
        .connector
        .stats()
        .executed
        .iter()
        .all(|(_, _, d)| *d == Some(Duration::from_secs(5))));
}

#[test]
fn per_database_descriptor_substitutes_name() {
    let (mut primary, connector) = MockCluster::typical();
    let (_, _, connector) = scrape(&mut primary, connector);
    assert_eq!(
        connector.stats().connect_attempts,
        vec![
            "postgres://gpadmin@mdw:5432/app",
            "postgres://gpadmin@mdw:5432/sales"
        ]
    );
}

#[test]
fn scraper_name_is_stable() {
    let (_, connector) = MockCluster::typical();
    let scraper = DatabaseSizeScraper::new(MockCluster::config(), connector);
    assert_eq!(scraper.name(), "database_size_scraper");
}
