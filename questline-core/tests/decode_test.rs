use questline_core::models::*;
use questline_core::{Database, DecodeError, StoreError};
use rusqlite::{params, Connection};

fn seeded(dir: &tempfile::TempDir) -> (Database, Task, std::path::PathBuf) {
    let path = dir.path().join("questline.db");
    let db = Database::open(&path).unwrap();
    db.migrate().unwrap();
    let project = db
        .create_project(CreateProjectInput {
            name: "Disk".into(),
            path: "/code/disk".into(),
            ..Default::default()
        })
        .unwrap();
    let quest = db
        .create_quest(project.id, CreateQuestInput { title: "Q".into(), ..Default::default() })
        .unwrap();
    let task = db
        .create_task(quest.id, CreateTaskInput {
            title: "T".into(),
            blockers: vec!["one".into()],
            ..Default::default()
        })
        .unwrap();
    (db, task, path)
}

#[test]
fn malformed_list_column_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (db, task, path) = seeded(&dir);

    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE tasks SET blockers = ?1 WHERE id = ?2",
        params!["[\"unterminated", task.id.to_string()],
    )
    .unwrap();

    let stored = db.get_task(task.id).unwrap().unwrap();
    assert!(stored.blockers.is_empty());
}

#[test]
fn null_list_column_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (db, task, path) = seeded(&dir);

    let raw = Connection::open(&path).unwrap();
    raw.execute("UPDATE tasks SET blockers = NULL WHERE id = ?1", params![task.id.to_string()])
        .unwrap();

    assert!(db.get_task(task.id).unwrap().unwrap().blockers.is_empty());
}

#[test]
fn corrupt_timestamp_is_a_typed_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let (db, task, path) = seeded(&dir);

    let raw = Connection::open(&path).unwrap();
    raw.execute(
        "UPDATE tasks SET created_at = 'last tuesday' WHERE id = ?1",
        params![task.id.to_string()],
    )
    .unwrap();

    match db.get_task(task.id) {
        Err(StoreError::Decode(DecodeError::InvalidTimestamp { field, value })) => {
            assert_eq!(field, "tasks.created_at");
            assert_eq!(value, "last tuesday");
        }
        other => panic!("expected decode error, got {:?}", other.map(|t| t.map(|t| t.id))),
    }
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (db, task, path) = seeded(&dir);
    drop(db);

    let reopened = Database::open(&path).unwrap();
    reopened.migrate().unwrap();
    let stored = reopened.get_task(task.id).unwrap().unwrap();
    assert_eq!(stored.blockers, vec!["one".to_string()]);
}
