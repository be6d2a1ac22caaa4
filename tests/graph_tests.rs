//! Integration tests for dependency graph operations.
//!
//! Tests cycle rejection, rollback, idempotency and cascade removal.

mod common;

use common::TestEnv;
use taskdeps::{DependencyEngine, DependencyError, GraphStore, Store};

// =============================================================================
// Cycle Rejection
// =============================================================================

#[test]
fn test_three_task_cycle_rejected() {
    let mut env = TestEnv::new();

    let t1 = env.create_task("Task 1");
    let t2 = env.create_task("Task 2");
    let t3 = env.create_task("Task 3");

    env.depend(&t1, &t2);
    env.depend(&t2, &t3);

    let path = env.expect_cycle(&t3, &t1);
    assert_eq!(path, vec![t3.id, t1.id, t2.id, t3.id]);

    // Edge (3, 1) absent afterward
    assert!(!env.edges().contains(&(t3.id, t1.id)));
    assert_eq!(env.edges().len(), 2);
}

#[test]
fn test_witness_is_closed_loop_rotation() {
    let mut env = TestEnv::new();

    let t1 = env.create_task("Task 1");
    let t2 = env.create_task("Task 2");
    let t3 = env.create_task("Task 3");
    env.depend(&t1, &t2);
    env.depend(&t2, &t3);

    let path = env.expect_cycle(&t3, &t1);
    assert_eq!(path.first(), path.last());

    // Same members as [1, 2, 3, 1], in loop order
    let loop_body = &path[..path.len() - 1];
    let start = loop_body.iter().position(|&id| id == t1.id).unwrap();
    let mut rotated = loop_body[start..].to_vec();
    rotated.extend_from_slice(&loop_body[..start]);
    assert_eq!(rotated, vec![t1.id, t2.id, t3.id]);
}

#[test]
fn test_witness_is_deterministic() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    let d = env.create_task("D");
    env.depend(&a, &b);
    env.depend(&a, &c);
    env.depend(&b, &d);
    env.depend(&c, &d);

    let first = env.expect_cycle(&d, &a);
    let second = env.expect_cycle(&d, &a);
    assert_eq!(first, second);
    // Lowest id explored first
    assert_eq!(first, vec![d.id, a.id, b.id, d.id]);
}

#[test]
fn test_two_task_cycle_rejected() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    env.depend(&a, &b);

    assert_eq!(env.expect_cycle(&b, &a), vec![b.id, a.id, b.id]);
    assert_eq!(env.edges(), vec![(a.id, b.id)]);
}

#[test]
fn test_long_chain_cycle_rejected() {
    let mut env = TestEnv::new();

    let tasks: Vec<_> = (0..50).map(|i| env.create_task(&format!("Task {}", i))).collect();
    for pair in tasks.windows(2) {
        env.depend(&pair[0], &pair[1]);
    }

    let path = env.expect_cycle(&tasks[49], &tasks[0]);
    assert_eq!(path.len(), 51);
    assert_eq!(env.edges().len(), 49);
}

#[test]
fn test_diamond_is_not_a_cycle() {
    let mut env = TestEnv::new();

    let top = env.create_task("Top");
    let left = env.create_task("Left");
    let right = env.create_task("Right");
    let bottom = env.create_task("Bottom");

    env.depend(&top, &left);
    env.depend(&top, &right);
    env.depend(&left, &bottom);
    env.depend(&right, &bottom);

    assert_eq!(env.edges().len(), 4);
}

// =============================================================================
// Idempotency and Removal
// =============================================================================

#[test]
fn test_add_dependency_twice_is_noop() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");

    env.depend(&a, &b);
    env.depend(&a, &b);

    assert_eq!(env.edges(), vec![(a.id, b.id)]);
}

#[test]
fn test_removed_edge_allows_reverse() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    env.depend(&a, &b);

    env.store.remove_dependency(a.id, b.id).unwrap();
    env.depend(&b, &a);

    assert_eq!(env.edges(), vec![(b.id, a.id)]);
}

#[test]
fn test_delete_task_removes_edges_both_ways() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.depend(&a, &b);
    env.depend(&b, &c);

    env.store.delete(b.id).unwrap();

    assert!(env.edges().is_empty());
    let view = env.store.view(a.id).unwrap();
    assert!(view.depends_on.is_empty());
    let view = env.store.view(c.id).unwrap();
    assert!(view.dependents.is_empty());

    // Without b in the way, c -> a is allowed
    env.depend(&c, &a);
}

#[test]
fn test_view_lists_both_directions() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    let c = env.create_task("C");
    env.depend(&b, &a);
    env.depend(&c, &a);
    let d = env.create_task("D");
    env.depend(&a, &d);

    let view = env.store.view(a.id).unwrap();
    assert_eq!(view.dependents, vec![b.id, c.id]);
    assert_eq!(view.depends_on, vec![d.id]);
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_graph_survives_reopen() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    env.depend(&a, &b);

    let mut reopened = Store::open(env.temp_dir.path()).unwrap();
    assert_eq!(reopened.direct_dependencies(a.id).into_iter().collect::<Vec<_>>(), vec![b.id]);
    assert_eq!(reopened.dependents(b.id).into_iter().collect::<Vec<_>>(), vec![a.id]);
    assert!(reopened.add_dependency(b.id, a.id).is_err());
}

#[test]
fn test_rejected_edge_not_persisted() {
    let mut env = TestEnv::new();

    let a = env.create_task("A");
    let b = env.create_task("B");
    env.depend(&a, &b);
    env.expect_cycle(&b, &a);

    let reopened = Store::open(env.temp_dir.path()).unwrap();
    assert_eq!(reopened.dependencies().unwrap().len(), 1);
}

// =============================================================================
// Engine used directly
// =============================================================================

#[test]
fn test_engine_without_store() {
    let engine = DependencyEngine::new(GraphStore::new().into_shared());

    assert_eq!(engine.propose_edge(1, 2), Ok(true));
    assert_eq!(engine.propose_edge(2, 3), Ok(true));
    assert_eq!(
        engine.propose_edge(3, 1),
        Err(DependencyError::Cycle { path: vec![3, 1, 2, 3] })
    );
    assert_eq!(engine.propose_edge(1, 1), Err(DependencyError::SelfDependency(1)));

    let graph = engine.graph().read().unwrap();
    assert_eq!(graph.edges(), vec![(1, 2), (2, 3)]);
}
