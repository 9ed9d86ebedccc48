use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Broker, MemoryBroker, StreamReader};
use crate::client::{Farm, FarmError};
use crate::games::connect4::{Board, Connect4, Drop, Mark};
use crate::search::tree::{NodeId, ROOT_ID};
use crate::search::{Engine, MctsSetting};
use crate::tests::c4_board;
use crate::wire::{self, StreamEnvelope};

#[test]
fn channels_fan_out_to_every_subscriber() {
    let broker = MemoryBroker::new();
    let first = broker.subscribe("commands");
    let second = broker.subscribe("commands");

    broker.publish("commands", "hello".to_string()).unwrap();
    assert_eq!(first.try_recv(), Some("hello".to_string()));
    assert_eq!(second.try_recv(), Some("hello".to_string()));
    assert_eq!(first.try_recv(), None);
}

#[test]
fn stream_readers_only_see_new_entries() {
    let broker = MemoryBroker::new();
    broker.append("s", "a".to_string()).unwrap();
    broker.append("s", "b".to_string()).unwrap();

    let mut reader = StreamReader::new();
    assert_eq!(reader.read(&broker, "s").unwrap(), vec!["a", "b"]);
    assert_eq!(reader.read(&broker, "s").unwrap(), Vec::<String>::new());

    broker.append("s", "c".to_string()).unwrap();
    assert_eq!(reader.read(&broker, "s").unwrap(), vec!["c"]);
}

fn broadcast_walks(
    engine: &mut Engine<Connect4>,
    walks: usize,
    broker: &MemoryBroker,
    stream: &str,
    engineserver_id: u32,
) {
    let logs = engine.run_walks(walks).unwrap();
    for log in &logs {
        for event in wire::walk_events::<Connect4>(log) {
            let envelope = StreamEnvelope {
                engineserver_id,
                event,
            };
            broker.append(stream, wire::encode(&envelope)).unwrap();
        }
    }
}

fn consume_peers(
    engine: &mut Engine<Connect4>,
    reader: &mut StreamReader,
    broker: &MemoryBroker,
    stream: &str,
    engineserver_id: u32,
) {
    for payload in reader.read(broker, stream).unwrap() {
        let envelope: StreamEnvelope = wire::decode(&payload).unwrap();
        if envelope.engineserver_id == engineserver_id {
            continue;
        }
        engine.apply_remote(&envelope.event).unwrap();
    }
}

/// Scenario: two engines search the same position, trading walk logs over
/// a broker stream. Their node sets converge; visit counts stay local.
#[test]
fn two_workers_converge_on_one_tree() {
    let broker = MemoryBroker::new();
    let stream = wire::gamestate_stream(1);
    let board = Board::empty();

    let mut first = Engine::<Connect4>::from_seed(board.clone(), MctsSetting::default(), 61);
    let mut second = Engine::<Connect4>::from_seed(board, MctsSetting::default(), 62);
    let mut first_reader = StreamReader::new();
    let mut second_reader = StreamReader::new();

    // Interleaved batches, like the worker loop's step.
    for _ in 0..5 {
        broadcast_walks(&mut first, 10, &broker, &stream, 1);
        consume_peers(&mut first, &mut first_reader, &broker, &stream, 1);
        broadcast_walks(&mut second, 10, &broker, &stream, 2);
        consume_peers(&mut second, &mut second_reader, &broker, &stream, 2);
    }
    // Drain whatever the other side produced last.
    consume_peers(&mut first, &mut first_reader, &broker, &stream, 1);
    consume_peers(&mut second, &mut second_reader, &broker, &stream, 2);

    let first_ids: HashSet<NodeId> = first.tree().nodes().map(|n| n.id).collect();
    let second_ids: HashSet<NodeId> = second.tree().nodes().map(|n| n.id).collect();
    assert_eq!(first_ids, second_ids);

    let first_root = first.tree().get(ROOT_ID).unwrap().visits;
    let second_root = second.tree().get(ROOT_ID).unwrap().visits;
    assert_eq!(first_root + second_root, 100);

    first.tree().validate().unwrap();
    second.tree().validate().unwrap();
}

/// Scenario: a real farm answers with the winning move.
#[test]
fn farm_finds_the_winning_column() {
    let board = c4_board(
        [
            "-------", "-------", "-------", "-------", "-----O-", "XXX-OO-",
        ],
        Mark::X,
    );

    let mut farm = Farm::launch(2);
    let action = farm
        .request_action::<Connect4>(&board, Duration::from_secs(1))
        .unwrap();
    farm.shutdown();

    assert_eq!(
        action,
        Drop {
            column: 3,
            mark: Mark::X
        }
    );
}

#[test]
fn requests_time_out_without_workers() {
    let mut farm = Farm::launch(0);
    let result = farm.request_action_within::<Connect4>(
        &Board::empty(),
        Duration::from_millis(50),
        Duration::from_millis(200),
    );
    farm.shutdown();

    assert!(matches!(result, Err(FarmError::Timeout { .. })));
}

#[test]
fn workers_exit_when_the_broker_shuts_down() {
    let broker = Arc::new(MemoryBroker::new());
    let handle = crate::server::spawn(Arc::clone(&broker) as Arc<dyn Broker>);
    broker.shutdown();
    handle.join().unwrap();
}
