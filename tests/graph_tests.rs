/// Integration tests for the temporal graph core.
///
/// These cover the write pipeline, the version chain, point-in-time
/// reads, the audit log, and the invariants that hold for every entity:
/// dense versions, a single head state, and exactly one state covering
/// any instant of the entity's lifetime.
use chrono::{Duration, Utc};
use mnemograph::prelude::*;
use mnemograph::{AuditAction, PropMap};
use serde_json::json;
use std::sync::Arc;
use tokio::time::sleep;

fn schema() -> SchemaDef {
    serde_yaml::from_str(
        r#"
nodes:
  - label: Service
    properties:
      name: { kind: string, required: true }
      status: { kind: enum, values: [active, deprecated], default: active }
      port: { kind: number }
edges:
  - type: DEPENDS_ON
    from: Service
    to: Service
"#,
    )
    .unwrap()
}

fn props(value: serde_json::Value) -> PropMap {
    value.as_object().unwrap().clone()
}

async fn graph() -> Mnemograph {
    Mnemograph::in_memory(&schema()).await.unwrap()
}

#[tokio::test]
async fn first_write_creates_entity_with_audit() {
    let graph = graph().await;
    let result = graph
        .pipeline()
        .upsert(
            "Service",
            None,
            &props(json!({"name": "Auth", "status": "active"})),
            "alice",
        )
        .await
        .unwrap();

    assert!(result.created);
    assert_eq!(result.version, 1);

    let (entity, state) = graph
        .reader()
        .get_current(&result.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.label, "Service");
    assert_eq!(state.props["name"], json!("Auth"));

    let audit = graph.reader().audit(&result.id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Create);
    assert_eq!(audit[0].actor, "alice");
}

#[tokio::test]
async fn version_chain_and_diff() {
    let graph = graph().await;
    let first = graph
        .pipeline()
        .upsert(
            "Service",
            None,
            &props(json!({"name": "Auth", "status": "active"})),
            "alice",
        )
        .await
        .unwrap();

    let second = graph
        .pipeline()
        .upsert(
            "Service",
            Some(&first.id),
            &props(json!({"name": "Auth", "status": "deprecated"})),
            "alice",
        )
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.version, 2);

    let history = graph.reader().history(&first.id).await.unwrap();
    assert_eq!(history.len(), 2);

    let diff = graph.reader().diff(&first.id, 1, 2).await.unwrap();
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].property, "status");
    assert_eq!(diff.changes[0].old, Some(json!("active")));
    assert_eq!(diff.changes[0].new, Some(json!("deprecated")));
}

#[tokio::test]
async fn point_in_time_reads_select_the_covering_state() {
    let graph = graph().await;
    let id = graph
        .pipeline()
        .upsert("Service", None, &props(json!({"name": "Auth"})), "alice")
        .await
        .unwrap()
        .id;
    let t1 = graph
        .reader()
        .get_current(&id)
        .await
        .unwrap()
        .unwrap()
        .1
        .valid_from;

    sleep(std::time::Duration::from_millis(10)).await;
    graph
        .pipeline()
        .upsert(
            "Service",
            Some(&id),
            &props(json!({"name": "Auth", "status": "deprecated"})),
            "alice",
        )
        .await
        .unwrap();
    let t2 = graph
        .reader()
        .get_current(&id)
        .await
        .unwrap()
        .unwrap()
        .1
        .valid_from;

    let between = t1 + (t2 - t1) / 2;
    let (_, at_between) = graph.reader().get_at_time(&id, between).await.unwrap().unwrap();
    assert_eq!(at_between.props["status"], json!("active"));

    let (_, at_t2) = graph.reader().get_at_time(&id, t2).await.unwrap().unwrap();
    assert_eq!(at_t2.props["status"], json!("deprecated"));
}

/// For every timestamp in the entity's lifetime, exactly one state covers
/// it.
#[tokio::test]
async fn single_covering_state_invariant() {
    let graph = graph().await;
    let id = graph
        .pipeline()
        .upsert("Service", None, &props(json!({"name": "Auth"})), "alice")
        .await
        .unwrap()
        .id;
    for round in 0..4 {
        sleep(std::time::Duration::from_millis(5)).await;
        graph
            .pipeline()
            .upsert(
                "Service",
                Some(&id),
                &props(json!({"name": "Auth", "port": round})),
                "alice",
            )
            .await
            .unwrap();
    }

    let history = graph.reader().history(&id).await.unwrap();
    assert_eq!(history.len(), 5);

    // Versions are dense 1..=5 and exactly one head exists.
    let mut versions: Vec<_> = history.iter().map(|s| s.version).collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=5).collect::<Vec<u64>>());
    assert_eq!(history.iter().filter(|s| s.valid_to.is_none()).count(), 1);

    // Probe instants across the whole lifetime.
    let start = history.last().unwrap().valid_from;
    let end = Utc::now() + Duration::milliseconds(50);
    let mut probe = start;
    while probe < end {
        let covering = history
            .iter()
            .filter(|s| {
                s.valid_from <= probe && s.valid_to.map_or(true, |e| probe < e)
            })
            .count();
        assert_eq!(covering, 1, "at {probe}");
        probe = probe + Duration::milliseconds(3);
    }
}

#[tokio::test]
async fn soft_delete_hides_current_and_preserves_the_past() {
    let graph = graph().await;
    let id = graph
        .pipeline()
        .upsert("Service", None, &props(json!({"name": "Auth"})), "alice")
        .await
        .unwrap()
        .id;
    let before_delete = Utc::now();
    sleep(std::time::Duration::from_millis(5)).await;

    graph.pipeline().delete(&id, "bob").await.unwrap();

    assert!(graph.reader().get_current(&id).await.unwrap().is_none());
    assert!(graph
        .reader()
        .get_at_time(&id, before_delete)
        .await
        .unwrap()
        .is_some());
    assert!(graph
        .reader()
        .get_at_time(&id, Utc::now())
        .await
        .unwrap()
        .is_none());

    let audit = graph.reader().audit(&id).await.unwrap();
    assert_eq!(audit.last().unwrap().action, AuditAction::Delete);
    assert_eq!(audit.last().unwrap().actor, "bob");
}

#[tokio::test]
async fn concurrent_upserts_yield_dense_versions_and_full_audit() {
    let graph = Arc::new(graph().await);
    graph
        .pipeline()
        .upsert("Service", Some("svc-race"), &props(json!({"name": "Race"})), "seed")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let graph = graph.clone();
        handles.push(tokio::spawn(async move {
            graph
                .pipeline()
                .upsert(
                    "Service",
                    Some("svc-race"),
                    &props(json!({"name": "Race", "port": i})),
                    "racer",
                )
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let history = graph.reader().history("svc-race").await.unwrap();
    assert_eq!(history.len(), 13);
    let versions: Vec<_> = history.iter().map(|s| s.version).collect();
    assert_eq!(versions, (1..=13).rev().collect::<Vec<u64>>());
    assert_eq!(history.iter().filter(|s| s.valid_to.is_none()).count(), 1);
    assert_eq!(graph.reader().audit("svc-race").await.unwrap().len(), 13);
}

#[tokio::test]
async fn relationships_and_snapshot() {
    let graph = graph().await;
    let a = graph
        .pipeline()
        .upsert("Service", Some("a"), &props(json!({"name": "A"})), "alice")
        .await
        .unwrap();
    let b = graph
        .pipeline()
        .upsert("Service", Some("b"), &props(json!({"name": "B"})), "alice")
        .await
        .unwrap();
    graph
        .pipeline()
        .relate(&a.id, &b.id, "DEPENDS_ON", "Service", "Service", None, "alice")
        .await
        .unwrap();

    let snapshot_time = Utc::now();
    sleep(std::time::Duration::from_millis(5)).await;
    graph
        .pipeline()
        .unrelate(&a.id, &b.id, "DEPENDS_ON", "alice")
        .await
        .unwrap();

    let snapshot = graph.reader().snapshot_at(snapshot_time, None).await.unwrap();
    assert_eq!(snapshot.entities.len(), 2);
    assert_eq!(snapshot.relationships.len(), 1);
    assert_eq!(snapshot.relationships[0].rel_type, "DEPENDS_ON");

    let now_snapshot = graph.reader().snapshot_at(Utc::now(), None).await.unwrap();
    assert!(now_snapshot.relationships.is_empty());

    let relate_audit = graph.reader().audit(&a.id).await.unwrap();
    let actions: Vec<_> = relate_audit.iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::Relate));
    assert!(actions.contains(&AuditAction::Unrelate));
}

#[tokio::test]
async fn search_and_changes_since() {
    let graph = graph().await;
    for (id, name, port) in [("a", "Auth", 8080), ("b", "Billing", 9090), ("c", "Cache", 6379)] {
        graph
            .pipeline()
            .upsert(
                "Service",
                Some(id),
                &props(json!({"name": name, "port": port})),
                "alice",
            )
            .await
            .unwrap();
    }

    let hits = graph
        .reader()
        .search(
            "Service",
            &[SearchFilter::new("port", FilterOp::Gt, 7000)],
            10,
            Some(&OrderBy {
                property: "port".to_string(),
                descending: false,
            }),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].1.props["name"], json!("Auth"));
    assert_eq!(hits[1].1.props["name"], json!("Billing"));

    let cutoff = Utc::now();
    sleep(std::time::Duration::from_millis(5)).await;
    graph
        .pipeline()
        .upsert(
            "Service",
            Some("a"),
            &props(json!({"name": "Auth", "status": "deprecated"})),
            "bob",
        )
        .await
        .unwrap();

    let changes = graph
        .reader()
        .changes_since(cutoff, None, None, 10)
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].entity_id, "a");
    assert_eq!(changes[0].last_actor, "bob");
}

#[tokio::test]
async fn validation_gate_rejects_everything_the_schema_does_not_know() {
    let graph = graph().await;

    // Unknown label
    assert!(graph
        .pipeline()
        .upsert("Ghost", None, &PropMap::new(), "alice")
        .await
        .is_err());

    // Unknown property
    assert!(graph
        .pipeline()
        .upsert(
            "Service",
            None,
            &props(json!({"name": "X", "color": "red"})),
            "alice"
        )
        .await
        .is_err());

    // Bad enum member
    assert!(graph
        .pipeline()
        .upsert(
            "Service",
            None,
            &props(json!({"name": "X", "status": "zombie"})),
            "alice"
        )
        .await
        .is_err());

    // Nothing leaked into the store.
    assert!(graph
        .reader()
        .query_by_label("Service")
        .await
        .unwrap()
        .is_empty());
}
