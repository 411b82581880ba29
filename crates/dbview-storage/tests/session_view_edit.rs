use dbview_storage::viewer::{count_matching, fetch_page};
use dbview_storage::{
    CellEdit, CellKind, CellValue, EditError, EditOutcome, Engine, InMemoryWorkingFileStore,
    Level, PageQuery, Session, WorkingFileStore,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn seeded_bytes(sql: &str) -> Vec<u8> {
    let engine = Engine::open_empty().expect("open engine");
    engine.execute(sql).expect("seed database");
    engine.export_bytes().expect("export seed")
}

fn users_sql(count: usize) -> String {
    let mut sql = String::from("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score INTEGER);");
    for i in 1..=count {
        sql.push_str(&format!("INSERT INTO users VALUES ({i}, 'user{i}', {});", i * 10));
    }
    sql
}

fn open(sql: &str) -> (Session, Arc<InMemoryWorkingFileStore>) {
    let store = Arc::new(InMemoryWorkingFileStore::new());
    let session = Session::load(seeded_bytes(sql), "test.db", store.clone()).expect("load session");
    (session, store)
}

fn total_changes(session: &Session) -> i64 {
    let result = session
        .engine()
        .query("SELECT total_changes()")
        .expect("total_changes");
    match result.rows[0][0] {
        CellValue::Integer(n) => n,
        ref other => panic!("unexpected total_changes value {other:?}"),
    }
}

fn ids(session: &Session) -> Vec<i64> {
    session
        .current_view()
        .expect("view")
        .rows
        .iter()
        .map(|r| match r.key.as_ref().map(|k| &k.value) {
            Some(CellValue::Integer(id)) => *id,
            other => panic!("unexpected key {other:?}"),
        })
        .collect()
}

#[test]
fn last_page_of_twenty_five_rows_has_five_rows() {
    let (mut session, _store) = open(&users_sql(25));
    assert!(session.show_table("users"));

    let view = session.current_view().unwrap();
    assert_eq!(view.pagination.total_pages, 3);
    assert_eq!(view.pagination.total_rows, 25);
    assert!(view.pagination.has_next());
    assert!(!view.pagination.has_prev());

    assert!(session.show_page(3));
    assert_eq!(ids(&session), vec![21, 22, 23, 24, 25]);
    let pagination = session.current_view().unwrap().pagination;
    assert!(!pagination.has_next());
    assert!(pagination.has_prev());

    // Next is disabled on the last page.
    assert!(!session.next_page());
    assert!(session.prev_page());
    assert_eq!(ids(&session), (11..=20).collect::<Vec<_>>());
}

#[test]
fn pages_slice_the_filtered_set() {
    let engine = Engine::open_bytes(&seeded_bytes(&users_sql(37))).expect("open");
    let columns = engine.table_metadata("users").expect("metadata");

    for filter in [None, Some("user1"), Some("USER2"), Some("nomatch")] {
        let total = count_matching(&engine, "users", &columns, filter).expect("count");
        let everything = fetch_page(
            &engine,
            &PageQuery {
                table_name: "users".into(),
                filter: filter.map(str::to_string),
                page: 1,
                page_size: usize::MAX / 2,
            },
            &columns,
        )
        .expect("fetch all");
        assert_eq!(total as usize, everything.rows.len(), "filter {filter:?}");

        let pages = (total as usize).div_ceil(10);
        for page in 1..=pages {
            let query = PageQuery::new("users")
                .with_filter(filter.map(str::to_string))
                .with_page(page);
            let fetched = fetch_page(&engine, &query, &columns).expect("fetch page");
            let start = (page - 1) * 10;
            let end = (page * 10).min(total as usize);
            assert_eq!(fetched.rows, everything.rows[start..end].to_vec());
        }
    }
}

#[test]
fn filter_is_case_insensitive_and_matches_any_column() {
    let (mut session, _store) = open(&users_sql(25));
    session.show_table("users");
    assert!(session.set_filter(Some("USER2".to_string())));
    // user2, user20..user25
    assert_eq!(ids(&session), vec![2, 20, 21, 22, 23, 24, 25]);

    // Numeric columns match through their text form.
    assert!(session.set_filter(Some("250".to_string())));
    assert_eq!(ids(&session), vec![25]);
}

#[test]
fn filter_with_quote_finds_the_row() {
    let (mut session, _store) = open(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO people VALUES (1, 'O''Brien');
         INSERT INTO people VALUES (2, 'Smith');",
    );
    session.show_table("people");
    assert!(session.set_filter(Some("o'brien".to_string())));
    assert_eq!(ids(&session), vec![1]);
    assert!(session
        .take_notifications()
        .iter()
        .all(|n| n.level != Level::Error));
}

#[test]
fn filter_survives_paging_and_resets_page() {
    let (mut session, _store) = open(&users_sql(25));
    session.show_table("users");
    session.show_page(2);
    session.set_filter(Some("user1".to_string()));
    let view = session.current_view().unwrap();
    // user1, user10..user19
    assert_eq!(view.pagination.page, 1);
    assert_eq!(view.pagination.total_rows, 11);
    assert!(session.next_page());
    assert_eq!(ids(&session), vec![19]);
    assert_eq!(
        session.current_view().unwrap().filter.as_deref(),
        Some("user1")
    );
}

#[test]
fn blank_filter_means_no_filter() {
    let (mut session, _store) = open(
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO people VALUES (1, 'Ann');
         INSERT INTO people VALUES (2, 'Bob');",
    );
    session.show_table("people");
    assert!(session.set_filter(Some("   ".to_string())));

    let view = session.current_view().unwrap();
    assert_eq!(view.filter, None);
    assert_eq!(view.pagination.total_rows, 2);
    assert_eq!(ids(&session), vec![1, 2]);
}

#[test]
fn editing_a_cell_updates_exactly_one_row() {
    let (mut session, store) = open(&users_sql(12));
    session.show_table("users");
    session.show_page(1);
    let before = total_changes(&session);

    // Row with id 7 is the seventh on page one; its score is 70.
    let outcome = session.edit_cell(6, "score", "43").expect("edit");
    assert_eq!(outcome, EditOutcome::Updated);
    assert_eq!(total_changes(&session) - before, 1);

    let stored = session
        .engine()
        .query("SELECT score FROM users WHERE id = 7")
        .expect("query");
    assert_eq!(stored.rows, vec![vec![CellValue::Integer(43)]]);

    // The view was re-rendered from the engine, same page.
    let view = session.current_view().unwrap();
    assert_eq!(view.pagination.page, 1);
    assert_eq!(
        view.rows[6].cell("score").unwrap().value,
        CellValue::Integer(43)
    );

    assert!(session.is_modified());
    let persisted = store.get_raw().unwrap().expect("persisted");
    assert!(persisted.modified);
    let reopened = Engine::open_bytes(&persisted.bytes).expect("reopen persisted");
    let stored = reopened
        .query("SELECT score FROM users WHERE id = 7")
        .expect("query");
    assert_eq!(stored.rows, vec![vec![CellValue::Integer(43)]]);
}

#[test]
fn unchanged_edit_issues_no_update() {
    let (mut session, store) = open(&users_sql(3));
    session.show_table("users");
    let persisted_before = store.get_raw().unwrap().unwrap().touched_at;
    let before = total_changes(&session);

    let outcome = session.edit_cell(0, "name", "  user1 \n").expect("edit");
    assert_eq!(outcome, EditOutcome::Unchanged);
    assert_eq!(total_changes(&session), before);
    assert!(!session.is_modified());
    assert_eq!(store.get_raw().unwrap().unwrap().touched_at, persisted_before);
}

#[test]
fn padded_text_committed_as_shown_issues_no_update() {
    let (mut session, store) = open(
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, v TEXT);
         INSERT INTO notes VALUES (1, '  padded ');",
    );
    session.show_table("notes");
    let persisted_before = store.get_raw().unwrap().unwrap().touched_at;
    let before = total_changes(&session);

    let outcome = session.edit_cell(0, "v", "  padded ").expect("edit");
    assert_eq!(outcome, EditOutcome::Unchanged);
    assert_eq!(total_changes(&session), before);
    assert!(!session.is_modified());
    assert_eq!(store.get_raw().unwrap().unwrap().touched_at, persisted_before);

    let stored = session
        .engine()
        .query("SELECT v FROM notes WHERE id = 1")
        .expect("query");
    assert_eq!(stored.rows, vec![vec![CellValue::Text("  padded ".into())]]);
}

#[test]
fn failed_edit_notifies_and_resyncs_view() {
    let (mut session, _store) = open(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, qty INTEGER CHECK (qty >= 0));
         INSERT INTO items VALUES (1, 5);",
    );
    session.show_table("items");
    let generation = session.current_view().unwrap().generation;

    let err = session.edit_cell(0, "qty", "-1").unwrap_err();
    assert!(matches!(err, EditError::Engine(_)));

    let notes = session.take_notifications();
    assert!(notes.iter().any(|n| n.level == Level::Error));
    let view = session.current_view().unwrap();
    assert!(view.generation > generation);
    assert_eq!(view.rows[0].cell("qty").unwrap().value, CellValue::Integer(5));
    assert!(!session.is_modified());
}

#[test]
fn table_without_primary_key_warns_and_is_read_only() {
    let (mut session, _store) = open(
        "CREATE TABLE logs (msg TEXT); INSERT INTO logs VALUES ('hello');",
    );
    assert!(session.show_table("logs"));
    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Warning);

    let view = session.current_view().unwrap();
    assert_eq!(view.primary_key, None);
    assert!(view.rows[0].cells.iter().all(|c| !c.editable));

    let err = session.edit_cell(0, "msg", "bye").unwrap_err();
    assert!(matches!(err, EditError::NoPrimaryKey(t) if t == "logs"));
}

#[test]
fn showing_a_filtered_page_renders_once() {
    let (mut session, _store) = open(
        "CREATE TABLE logs (msg TEXT);
         INSERT INTO logs VALUES ('a1'), ('a2'), ('b1');",
    );
    assert!(session.show("logs", 2, Some("a".to_string())));

    let notes = session.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Warning);

    let view = session.current_view().unwrap();
    assert_eq!(view.filter.as_deref(), Some("a"));
    assert_eq!(view.pagination.total_rows, 2);
    assert_eq!(view.generation, 1);
}

#[test]
fn cells_are_classified_for_rendering() {
    let (mut session, _store) = open(
        "CREATE TABLE media (id INTEGER PRIMARY KEY, site TEXT, pic BLOB, raw BLOB, note TEXT);
         INSERT INTO media VALUES (1, 'https://example.com', x'89504E470D0A1A0A0000', x'010203', NULL);",
    );
    session.show_table("media");
    let row = &session.current_view().unwrap().rows[0];

    let id = row.cell("id").unwrap();
    assert!(id.is_primary_key);
    assert!(!id.editable);

    let site = row.cell("site").unwrap();
    assert_eq!(
        site.kind,
        CellKind::Link {
            url: "https://example.com".into()
        }
    );
    assert!(site.editable);

    assert_eq!(row.cell("pic").unwrap().kind, CellKind::Image { mime: "image/png" });
    assert_eq!(row.cell("raw").unwrap().kind, CellKind::Blob);
    assert_eq!(row.cell("raw").unwrap().text(), "[BLOB]");

    let note = row.cell("note").unwrap();
    assert_eq!(note.kind, CellKind::Null);
    assert_eq!(note.text(), "NULL");
}

#[test]
fn binary_cells_cannot_be_edited_as_text() {
    let (mut session, _store) = open(
        "CREATE TABLE media (id INTEGER PRIMARY KEY, raw BLOB);
         INSERT INTO media VALUES (1, x'010203');",
    );
    session.show_table("media");
    let before = total_changes(&session);

    let err = session.edit_cell(0, "raw", "text").unwrap_err();
    assert!(matches!(err, EditError::BinaryCell(ref c) if c == "raw"));
    assert_eq!(total_changes(&session), before);
    assert!(!session.is_modified());
}

#[test]
fn failed_render_keeps_previous_view() {
    let (mut session, _store) = open(&users_sql(3));
    session.show_table("users");
    let before = session.current_view().cloned();

    assert!(!session.show_table("missing"));
    assert_eq!(session.current_view().cloned(), before);
    assert_eq!(session.active_table(), Some("users"));
    assert!(session.take_notifications().iter().any(|n| n.is_error()));
}

#[test]
fn deleting_active_table_clears_view_and_catalog_entry() {
    let (mut session, store) = open(
        "CREATE TABLE a (id INTEGER PRIMARY KEY); CREATE TABLE b (id INTEGER PRIMARY KEY);",
    );
    session.show_table("a");

    assert!(!session.delete_table("a", |_| false));
    assert_eq!(session.tables().len(), 2);

    assert!(session.delete_table("a", |name| name == "a"));
    let names: Vec<&str> = session.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["b"]);
    assert!(session.current_view().is_none());
    assert_eq!(session.active_table(), None);
    assert!(session.is_modified());

    let persisted = Engine::open_bytes(&store.get_raw().unwrap().unwrap().bytes).unwrap();
    assert!(persisted.table_metadata("a").is_err());
}

#[test]
fn deleting_other_table_keeps_view() {
    let (mut session, _store) = open(
        "CREATE TABLE a (id INTEGER PRIMARY KEY); CREATE TABLE b (id INTEGER PRIMARY KEY);",
    );
    session.show_table("a");
    assert!(session.delete_table("b", |_| true));
    assert_eq!(session.active_table(), Some("a"));
    assert!(session.current_view().is_some());
}

#[test]
fn failed_delete_leaves_catalog_unchanged() {
    let (mut session, _store) = open("CREATE TABLE a (id INTEGER PRIMARY KEY);");
    assert!(!session.delete_table("nope", |_| true));
    assert_eq!(session.tables().len(), 1);
    assert!(!session.is_modified());
    assert!(session.take_notifications().iter().any(|n| n.is_error()));
}

#[test]
fn commit_edit_uses_captured_key() {
    let (mut session, _store) = open(&users_sql(2));
    let edit = CellEdit {
        table: "users".into(),
        key: Some(dbview_storage::RowKey {
            column: "id".into(),
            value: CellValue::Integer(2),
        }),
        column: "name".into(),
        old_value: CellValue::Text("user2".into()),
        new_text: "renamed".into(),
    };
    assert_eq!(session.commit_edit(&edit).unwrap(), EditOutcome::Updated);
    let result = session
        .engine()
        .query("SELECT name FROM users ORDER BY id")
        .unwrap();
    assert_eq!(
        result.rows,
        vec![
            vec![CellValue::Text("user1".into())],
            vec![CellValue::Text("renamed".into())]
        ]
    );
}
