//! Configuration loading and command-script tests.

use std::io::Write;

use taskgrid_scheduler::*;
use taskgrid_state::StateError;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn scheduler_from_config_file() {
    let file = write_config(
        r#"
[schedule]
threshold = 5

[cluster]
nodes = [2, 1]
"#,
    );

    let config = SchedulerConfig::from_file(file.path()).unwrap();
    let mut scheduler = Scheduler::from_config(&config).unwrap();

    assert_eq!(scheduler.registry().node_ids(), vec![1, 2]);
    assert_eq!(scheduler.default_threshold(), Some(5));

    for id in 1..=4 {
        scheduler.add_task(id, 10).unwrap();
    }
    assert_eq!(
        scheduler.rebalance(),
        Ok(ScheduleOutcome::Succeeded { migrated: 4 })
    );
    assert_eq!(scheduler.registry().node(1).unwrap().consumption, 20);
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(SchedulerConfig::from_file(&dir.path().join("taskgrid.toml")).is_err());
}

#[test]
fn config_rejects_non_positive_threshold() {
    let config = SchedulerConfig::parse("[schedule]\nthreshold = 0\n").unwrap();
    assert_eq!(
        Scheduler::from_config(&config).unwrap_err(),
        SchedulerError::InvalidThreshold(0)
    );
}

#[test]
fn config_rejects_duplicate_nodes() {
    let config = SchedulerConfig::parse("[cluster]\nnodes = [1, 1]\n").unwrap();
    assert_eq!(
        Scheduler::from_config(&config).unwrap_err(),
        SchedulerError::State(StateError::NodeAlreadyRegistered(1))
    );
}

#[test]
fn json_script_produces_return_codes() {
    let script = r#"[
        {"op": "init"},
        {"op": "register_node", "node_id": 1},
        {"op": "register_node", "node_id": 2},
        {"op": "add_task", "task_id": 1, "consumption": 100},
        {"op": "schedule_task", "threshold": 1},
        {"op": "add_task", "task_id": 2, "consumption": 100},
        {"op": "schedule_task", "threshold": 1},
        {"op": "query_task_status"},
        {"op": "unregister_node", "node_id": 2},
        {"op": "delete_task", "task_id": 3}
    ]"#;
    let commands: Vec<Command> = serde_json::from_str(script).unwrap();

    let mut scheduler = Scheduler::new();
    let codes: Vec<&str> = commands
        .iter()
        .map(|c| scheduler.execute(c).code())
        .collect();

    assert_eq!(
        codes,
        vec!["E001", "E003", "E003", "E008", "E014", "E008", "E013", "E015", "E006", "E012"]
    );

    let status = scheduler.query_task_status();
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].node_id, 1);
    assert!(status[1].is_pending());
}

#[test]
fn status_serializes_for_transport() {
    let mut scheduler = Scheduler::new();
    scheduler.register_node(1).unwrap();
    scheduler.add_task(1, 3).unwrap();
    scheduler.add_task(2, 0).unwrap();
    scheduler.unregister_node(1).unwrap();

    let json = serde_json::to_value(scheduler.query_task_status()).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            {"task_id": 1, "node_id": -1, "consumption": 3},
            {"task_id": 2, "node_id": -1, "consumption": 0}
        ])
    );
}
