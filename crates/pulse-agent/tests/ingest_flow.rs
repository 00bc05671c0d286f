use pulse_agent::ingest::{run_ingest, IngestStats};
use pulse_engine::{Engine, EnvironmentProbe, PartialConfig, ScopedStore};

fn test_engine() -> Engine {
    Engine::builder(PartialConfig {
        api_url: Some("http://127.0.0.1:9/ingest".to_string()),
        flush_interval_ms: Some(3_600_000),
        max_batch_size: Some(100),
        ..PartialConfig::default()
    })
    .store(ScopedStore::in_memory("agent_"))
    .probe(EnvironmentProbe::default())
    .build()
    .expect("engine should build")
}

#[tokio::test]
async fn ingests_lines_and_skips_bad_ones() {
    let engine = test_engine();
    let input = br#"{"event": "signup", "properties": {"plan": "pro"}, "distinct_id": "u1"}

# comment
{"event": "purchase", "properties": {"amount": 12}}
{"broken": true
{"event": "logout"}
"#;

    let stats = run_ingest(&engine, &input[..]).await.expect("ingest should finish");

    assert_eq!(
        stats,
        IngestStats {
            tracked: 3,
            skipped: 1
        }
    );
    let events = engine.buffered_events();
    let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["session_start", "signup", "purchase", "logout"]);
    assert_eq!(events[1].distinct_id.as_deref(), Some("u1"));
    assert_eq!(events[1].properties["plan"], "pro");
    assert_eq!(events[2].properties["amount"], 12);
    assert_eq!(engine.distinct_id().as_deref(), Some("u1"));
}
