use revezone_core::db::open_db_in_memory;
use revezone_core::{ContentError, ContentStore, FileType, NodeId, SqliteContentStore};

#[test]
fn note_content_round_trips_verbatim() {
    let conn = open_db_in_memory().unwrap();
    let notes = SqliteContentStore::notes(&conn).unwrap();
    let id = NodeId::new_file();
    let content = "# Title\n\n- ünïcödé\r\n- trailing spaces   \n";

    assert_eq!(notes.get(&id).unwrap(), None);
    notes.add_or_update(&id, content).unwrap();
    assert_eq!(notes.get(&id).unwrap().as_deref(), Some(content));

    notes.add_or_update(&id, "second").unwrap();
    assert_eq!(notes.get(&id).unwrap().as_deref(), Some("second"));
}

#[test]
fn board_content_must_be_json() {
    let conn = open_db_in_memory().unwrap();
    let boards = SqliteContentStore::boards(&conn).unwrap();
    let id = NodeId::new_file();

    let err = boards.add_or_update(&id, "{not json").unwrap_err();
    assert!(matches!(err, ContentError::InvalidBoardJson(_)));
    assert_eq!(boards.get(&id).unwrap(), None);

    boards
        .add_or_update(&id, FileType::Board.empty_content())
        .unwrap();
    let stored = boards.get(&id).unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(value["type"], "excalidraw");
}

#[test]
fn stores_are_scoped_to_their_kind() {
    let conn = open_db_in_memory().unwrap();
    let notes = SqliteContentStore::notes(&conn).unwrap();
    let boards = SqliteContentStore::boards(&conn).unwrap();
    let id = NodeId::new_file();

    notes.add_or_update(&id, "text").unwrap();
    assert_eq!(boards.get(&id).unwrap(), None);

    let err = boards.add_or_update(&id, "{}").unwrap_err();
    assert!(matches!(
        err,
        ContentError::KindMismatch {
            expected: FileType::Board,
            ..
        }
    ));
    assert_eq!(notes.get(&id).unwrap().as_deref(), Some("text"));
}

#[test]
fn delete_reports_whether_content_existed() {
    let conn = open_db_in_memory().unwrap();
    let notes = SqliteContentStore::notes(&conn).unwrap();
    let id = NodeId::new_file();

    assert!(!notes.delete(&id).unwrap());
    notes.add_or_update(&id, "bye").unwrap();
    assert!(notes.delete(&id).unwrap());
    assert_eq!(notes.get(&id).unwrap(), None);
}

#[test]
fn folder_ids_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let notes = SqliteContentStore::notes(&conn).unwrap();
    let err = notes
        .add_or_update(&NodeId::new_folder(), "x")
        .unwrap_err();
    assert!(matches!(err, ContentError::NotAFileId(_)));
}
