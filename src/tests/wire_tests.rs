use crate::games::connect4::Connect4;
use crate::games::t2048::T2048;
use crate::search::walk::WalkEntry;
use crate::wire::{self, ActionReply, Command, EngineOptions, StreamEnvelope, WalkEvent};

#[test]
fn commands_round_trip_with_kebab_case_tags() {
    let command = Command::NewGamestate {
        game_type: "connect4".to_string(),
        gamestate_id: 42,
        gamestate: "{}".to_string(),
    };
    let payload = wire::encode(&command);
    assert!(payload.contains("\"command_type\":\"new-gamestate\""));
    assert_eq!(wire::decode::<Command>(&payload).unwrap(), command);

    let stop = wire::encode(&Command::Stop);
    assert!(stop.contains("\"command_type\":\"stop\""));
    assert_eq!(wire::decode::<Command>(&stop).unwrap(), Command::Stop);

    let config = Command::NewConfig {
        config: EngineOptions {
            heuristic_type: Some("pre-visit".to_string()),
            exploration_constant: None,
            walk_batch: Some(10),
        },
    };
    let payload = wire::encode(&config);
    assert_eq!(wire::decode::<Command>(&payload).unwrap(), config);
}

#[test]
fn unknown_command_variants_fail_to_decode() {
    let payload = r#"{"command_type":"explode","gamestate_id":1}"#;
    assert!(wire::decode::<Command>(payload).is_err());
}

#[test]
fn stream_envelopes_flatten_the_event() {
    let envelope = StreamEnvelope {
        engineserver_id: 7,
        event: WalkEvent::NewNode {
            id: 123,
            parent_id: 0,
            action: "3X".to_string(),
        },
    };
    let payload = wire::encode(&envelope);
    assert!(payload.contains("\"engineserver_id\":7"));
    assert!(payload.contains("\"event_type\":\"new-node\""));
    assert_eq!(wire::decode::<StreamEnvelope>(&payload).unwrap(), envelope);
}

#[test]
fn action_replies_round_trip() {
    let reply = ActionReply {
        gamestate_id: u64::MAX,
        best_move: "left".to_string(),
    };
    let payload = wire::encode(&reply);
    assert_eq!(wire::decode::<ActionReply>(&payload).unwrap(), reply);
}

#[test]
fn walk_events_skip_take_action_entries() {
    use crate::games::connect4::{Drop, Mark};

    let log = vec![
        WalkEntry::TakeAction {
            action: Drop {
                column: 1,
                mark: Mark::X,
            },
        },
        WalkEntry::NewNode {
            id: 9,
            parent: 0,
            action: Drop {
                column: 2,
                mark: Mark::X,
            },
        },
        WalkEntry::WalkResult {
            score: [(Mark::X, 1.0), (Mark::O, 0.0)].into_iter().collect(),
        },
    ];
    let events = wire::walk_events::<Connect4>(&log);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        WalkEvent::NewNode {
            id: 9,
            parent_id: 0,
            action: "2X".to_string(),
        }
    );
    match &events[1] {
        WalkEvent::WalkResult { score_vec } => {
            assert_eq!(score_vec["X"], 1.0);
            assert_eq!(score_vec["O"], 0.0);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn t2048_walk_results_use_the_player_name() {
    use crate::games::t2048::Solo;

    let log = vec![WalkEntry::WalkResult {
        score: [(Solo, 0.25)].into_iter().collect(),
    }];
    let events = wire::walk_events::<T2048>(&log);
    match &events[0] {
        WalkEvent::WalkResult { score_vec } => assert_eq!(score_vec["player"], 0.25),
        other => panic!("unexpected event {:?}", other),
    }
}
