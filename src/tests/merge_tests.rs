use std::collections::{HashMap, HashSet};

use crate::games::connect4::{Board, Connect4};
use crate::search::tree::{NodeId, Tree, ROOT_ID};
use crate::search::{ApplyError, Engine, MctsSetting};
use crate::wire::{self, WalkEvent};

type C4Tree = Tree<crate::games::connect4::Drop, crate::games::connect4::Mark>;

/// Run a seeded engine and return the wire projection of its walk logs.
fn events_from_walks(seed: u64, walks: usize) -> Vec<WalkEvent> {
    let mut engine = Engine::<Connect4>::from_seed(Board::empty(), MctsSetting::default(), seed);
    let logs = engine.run_walks(walks).unwrap();
    logs.iter()
        .flat_map(|log| wire::walk_events::<Connect4>(log))
        .collect()
}

fn fresh_engine(seed: u64) -> Engine<Connect4> {
    Engine::from_seed(Board::empty(), MctsSetting::default(), seed)
}

fn node_ids(tree: &C4Tree) -> HashSet<NodeId> {
    tree.nodes().map(|node| node.id).collect()
}

/// Edge sets per parent, ignoring insertion order: application order is
/// allowed to permute the child lists.
fn edge_sets(tree: &C4Tree) -> HashMap<NodeId, HashSet<NodeId>> {
    let mut sets: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for node in tree.nodes() {
        if let Some(parent) = node.parent {
            sets.entry(parent).or_default().insert(node.id);
        }
    }
    sets
}

fn apply_all(engine: &mut Engine<Connect4>, events: &[WalkEvent]) {
    for event in events {
        engine.apply_remote(event).unwrap();
    }
}

#[test]
fn applying_a_log_twice_changes_nothing() {
    let events = events_from_walks(21, 30);

    let mut engine = fresh_engine(0);
    apply_all(&mut engine, &events);
    let once = engine.tree().clone();

    apply_all(&mut engine, &events);
    assert_eq!(*engine.tree(), once);
}

#[test]
fn application_order_does_not_matter() {
    let events_a = events_from_walks(31, 25);
    let events_b = events_from_walks(32, 25);

    let mut ab = fresh_engine(0);
    apply_all(&mut ab, &events_a);
    apply_all(&mut ab, &events_b);

    let mut ba = fresh_engine(0);
    apply_all(&mut ba, &events_b);
    apply_all(&mut ba, &events_a);

    assert_eq!(node_ids(ab.tree()), node_ids(ba.tree()));
    assert_eq!(edge_sets(ab.tree()), edge_sets(ba.tree()));
}

#[test]
fn merged_trees_pass_validation() {
    let events = events_from_walks(41, 40);
    let mut engine = fresh_engine(0);
    apply_all(&mut engine, &events);
    engine.tree().validate().unwrap();
}

#[test]
fn walk_results_are_not_applied() {
    let mut engine = fresh_engine(0);
    let before = engine.tree().clone();
    engine
        .apply_remote(&WalkEvent::WalkResult {
            score_vec: [("X".to_string(), 1.0), ("O".to_string(), 0.0)]
                .into_iter()
                .collect(),
        })
        .unwrap();
    assert_eq!(*engine.tree(), before);
}

#[test]
fn unknown_parents_are_reported() {
    let mut engine = fresh_engine(0);
    let result = engine.apply_remote(&WalkEvent::NewNode {
        id: 7,
        parent_id: 999_999,
        action: "3X".to_string(),
    });
    assert_eq!(
        result,
        Err(ApplyError::UnknownParent {
            id: 7,
            parent: 999_999
        })
    );
}

#[test]
fn merging_peers_reproduces_their_expansions() {
    // The merged engine must know exactly the nodes the producer created.
    let events = events_from_walks(51, 30);
    let mut producer = Engine::<Connect4>::from_seed(Board::empty(), MctsSetting::default(), 51);
    producer.run_walks(30).unwrap();

    let mut consumer = fresh_engine(0);
    apply_all(&mut consumer, &events);

    assert_eq!(node_ids(consumer.tree()), node_ids(producer.tree()));
    // Merged nodes carry no visit statistics of their own.
    let new_node_count = events
        .iter()
        .filter(|event| matches!(event, WalkEvent::NewNode { .. }))
        .count();
    assert_eq!(consumer.tree().node_count(), new_node_count + 1);
    assert_eq!(consumer.tree().get(ROOT_ID).unwrap().visits, 0);
}
