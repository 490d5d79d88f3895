//! End-to-end scenarios across the whole API surface.

use std::sync::{Arc, Mutex};

use selenite::vtab::{array::ArrayTable, generator::Generator, SchemaColumn};
use selenite::{
    named_params, Backup, BlobMode, Connection, DatabaseName, Error, JournalMode, Op, Value,
};

#[test]
fn insert_and_query() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();
    conn.execute("INSERT INTO users (name) VALUES (?1)", ("Alice",))
        .unwrap();
    conn.execute("INSERT INTO users (name) VALUES (?1)", ("Bob",))
        .unwrap();

    let rows = conn
        .query("SELECT * FROM users ORDER BY id", ())
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_by_name_as::<String>("name").unwrap(), "Alice");
    assert_eq!(rows[1].get_as::<i64>(0).unwrap(), 2);

    assert_eq!(conn.last_insert_rowid(), 2);
    assert_eq!(conn.changes(), 1);
    assert_eq!(conn.total_changes(), 2);
}

#[test]
fn transaction_rollback_on_error() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

    let result: selenite::Result<()> = conn.transaction(|tx| {
        tx.execute("INSERT INTO t (v) VALUES (1)", ())?;
        Err(Error::Misuse("boom".to_string()))
    });
    assert!(result.is_err());

    let count = conn
        .query_one("SELECT count(*) FROM t", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!(count, 0);
    assert!(conn.is_autocommit());
}

#[test]
fn savepoint_partial_rollback() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

    let tx = conn
        .begin_transaction(selenite::TransactionBehavior::Deferred)
        .unwrap();
    tx.execute("INSERT INTO t (v) VALUES (1)", ()).unwrap();

    let inner: selenite::Result<()> = conn.with_savepoint("sp1", |sp| {
        sp.execute("INSERT INTO t (v) VALUES (2)", ())?;
        Err(Error::Misuse("boom".to_string()))
    });
    assert!(inner.is_err());

    tx.commit().unwrap();

    let rows = conn.query("SELECT v FROM t ORDER BY v", ()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_as::<i64>(0).unwrap(), 1);
}

#[test]
fn aggregate_product() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
    conn.exec_raw("INSERT INTO t VALUES (2), (3), (4)").unwrap();

    conn.create_aggregate_function(
        "product",
        1,
        || Value::Integer(1),
        |acc, args| match (acc, &args[0]) {
            (Value::Integer(acc), Value::Integer(v)) => Ok(Value::Integer(acc * v)),
            (acc, _) => Ok(acc),
        },
        Ok,
    )
    .unwrap();

    let product = conn
        .query_one("SELECT product(v) FROM t", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!(product, 24);

    // Zero rows scanned: the accumulator slot stays unset and the result is
    // NULL.
    conn.exec_raw("DELETE FROM t").unwrap();
    let row = conn
        .query_one("SELECT product(v) FROM t", ())
        .unwrap()
        .unwrap();
    assert_eq!(row.get(0), Some(&Value::Null));
}

#[test]
fn scalar_functions() {
    let conn = Connection::open_memory().unwrap();

    conn.create_scalar_function("halve", 1, |args| match &args[0] {
        Value::Real(v) => Ok(Value::Real(v / 2.0)),
        Value::Integer(v) => Ok(Value::Real(*v as f64 / 2.0)),
        _ => Err(Error::Misuse("halve expects a number".to_string())),
    })
    .unwrap();
    let halved = conn
        .query_one("SELECT halve(6)", ())
        .unwrap()
        .unwrap()
        .get_as::<f64>(0)
        .unwrap();
    assert_eq!(halved, 3.0);

    // A host error sets the per-call error slot and fails the statement.
    assert!(conn.query_one("SELECT halve('nope')", ()).is_err());

    conn.create_function_2("repeat_text", |s: String, n: i64| s.repeat(n as usize))
        .unwrap();
    let repeated = conn
        .query_one("SELECT repeat_text('ab', 3)", ())
        .unwrap()
        .unwrap()
        .get_as::<String>(0)
        .unwrap();
    assert_eq!(repeated, "ababab");

    // A failed argument conversion makes the typed wrapper return NULL.
    let row = conn
        .query_one("SELECT repeat_text(x'00', 3)", ())
        .unwrap()
        .unwrap();
    assert_eq!(row.get(0), Some(&Value::Null));

    conn.remove_function("halve", 1).unwrap();
    assert!(conn.query_one("SELECT halve(6)", ()).is_err());
}

#[test]
fn update_hook_ordering() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    conn.set_update_hook(move |op, table, rowid| {
        sink.lock().unwrap().push((op, table.to_string(), rowid));
    })
    .unwrap();

    conn.execute("INSERT INTO t (v) VALUES (10)", ()).unwrap();
    conn.execute("UPDATE t SET v = 20 WHERE rowid = 1", ())
        .unwrap();
    conn.execute("DELETE FROM t WHERE rowid = 1", ()).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (Op::Insert, "t".to_string(), 1),
            (Op::Update, "t".to_string(), 1),
            (Op::Delete, "t".to_string(), 1),
        ]
    );

    // Replacing the hook releases the old one; clearing stops delivery.
    conn.clear_update_hook().unwrap();
    conn.execute("INSERT INTO t (v) VALUES (30)", ()).unwrap();
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn blob_streaming() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE blobs (content BLOB)").unwrap();
    let mut insert = conn
        .prepare("INSERT INTO blobs (content) VALUES (?1)")
        .unwrap();
    insert.bind_zeroblob(1, 10240).unwrap();
    insert.execute(()).unwrap();
    let rowid = conn.last_insert_rowid();

    let mut blob = conn
        .open_blob(DatabaseName::Main, "blobs", "content", rowid, BlobMode::ReadWrite)
        .unwrap();
    assert_eq!(blob.bytes(), 10240);
    blob.write(0, &[0xA0, 0xA0, 0xA0, 0xA0]).unwrap();
    blob.write(5120, &[0xA5, 0xA5, 0xA5, 0xA5]).unwrap();

    // The handle cannot grow the cell.
    assert!(blob.write(10238, &[1, 2, 3]).is_err());

    blob.close().unwrap();
    blob.close().unwrap();
    assert!(matches!(blob.read(0, 4), Err(Error::ClosedHandle(_))));

    let blob = conn
        .open_blob(DatabaseName::Main, "blobs", "content", rowid, BlobMode::ReadOnly)
        .unwrap();
    assert_eq!(blob.read(0, 4).unwrap(), vec![0xA0; 4]);
    assert_eq!(blob.read(5120, 4).unwrap(), vec![0xA5; 4]);
    // Reads past the end fail instead of truncating.
    assert!(blob.read(10238, 4).is_err());
}

#[test]
fn blob_reopen_moves_to_another_row() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE blobs (content BLOB)").unwrap();
    conn.execute("INSERT INTO blobs (content) VALUES (x'01')", ())
        .unwrap();
    let first = conn.last_insert_rowid();
    conn.execute("INSERT INTO blobs (content) VALUES (x'0203')", ())
        .unwrap();
    let second = conn.last_insert_rowid();

    let mut blob = conn
        .open_blob(DatabaseName::Main, "blobs", "content", first, BlobMode::ReadOnly)
        .unwrap();
    assert_eq!(blob.read(0, 1).unwrap(), vec![0x01]);

    blob.reopen(second).unwrap();
    assert_eq!(blob.bytes(), 2);
    assert_eq!(blob.read(0, 2).unwrap(), vec![0x02, 0x03]);
}

#[test]
fn array_vtable() {
    let conn = Connection::open_memory().unwrap();
    let table = ArrayTable::new(vec![
        SchemaColumn::new("id", "INTEGER"),
        SchemaColumn::new("name", "TEXT"),
    ]);
    conn.create_module("people", table.clone()).unwrap();
    conn.exec_raw("CREATE VIRTUAL TABLE people USING people")
        .unwrap();

    let host_rowid = table.insert(vec![Value::Integer(1), Value::Text("Alice".into())]);
    conn.execute("INSERT INTO people (id, name) VALUES (2, 'Bob')", ())
        .unwrap();
    let sql_rowid = conn.last_insert_rowid();
    assert_ne!(host_rowid, sql_rowid);

    let count = conn
        .query_one("SELECT count(*) FROM people", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!(count, 2);

    let names = conn
        .query("SELECT name FROM people ORDER BY id", ())
        .unwrap();
    assert_eq!(names[0].get_as::<String>(0).unwrap(), "Alice");
    assert_eq!(names[1].get_as::<String>(0).unwrap(), "Bob");

    conn.execute("DELETE FROM people WHERE rowid = ?1", (host_rowid,))
        .unwrap();
    assert_eq!(table.len(), 1);

    conn.execute("UPDATE people SET name = 'Robert' WHERE id = 2", ())
        .unwrap();
    let rows = conn.query("SELECT name FROM people", ()).unwrap();
    assert_eq!(rows[0].get_as::<String>(0).unwrap(), "Robert");
}

#[test]
fn generator_vtable() {
    let conn = Connection::open_memory().unwrap();
    let counter = Generator::new(
        vec![SchemaColumn::new("value", "INTEGER")],
        || 1i64,
        |n| *n <= 10,
        |n| vec![Value::Integer(*n)],
        |n| n + 1,
    );
    conn.create_module("counter", counter).unwrap();
    conn.exec_raw("CREATE VIRTUAL TABLE counter USING counter")
        .unwrap();

    let sum = conn
        .query_one("SELECT sum(value) FROM counter", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!(sum, 55);

    // Writes through SQL fail with the read-only code.
    assert!(conn
        .execute("INSERT INTO counter (value) VALUES (11)", ())
        .is_err());
}

#[test]
fn backup_in_chunks() {
    let src = Connection::open_memory().unwrap();
    src.exec_raw("CREATE TABLE t (data BLOB)").unwrap();
    let payload: Vec<u8> = (0..1024).map(|_| rand::random::<u8>()).collect();
    src.transaction(|tx| {
        for _ in 0..100 {
            tx.execute("INSERT INTO t (data) VALUES (?1)", (payload.clone(),))?;
        }
        Ok(())
    })
    .unwrap();

    let dest = Connection::open_memory().unwrap();
    let mut backup = Backup::new(&src, &dest).unwrap();
    let mut steps = 0;
    while backup.step(5).unwrap() {
        steps += 1;
        assert!(backup.page_count() > 0);
        assert!(backup.progress() <= 100.0);
    }
    assert!(steps > 1);
    assert_eq!(backup.progress(), 100.0);
    backup.finish().unwrap();
    backup.finish().unwrap();

    let count = dest
        .query_one("SELECT count(*) FROM t", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!(count, 100);
}

#[test]
fn serialize_round_trip() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER, s TEXT)").unwrap();
    conn.exec_raw("INSERT INTO t VALUES (1, 'a'), (2, 'b')")
        .unwrap();

    let image = conn.serialize().unwrap();
    assert!(!image.is_empty());

    let copy = Connection::open_memory().unwrap();
    copy.deserialize_into(&image, false).unwrap();
    let rows = copy.query("SELECT v, s FROM t ORDER BY v", ()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get_as::<String>(1).unwrap(), "b");

    // A deserialized image serializes back to the same bytes.
    assert_eq!(copy.serialize().unwrap(), image);
}

#[test]
fn serialize_empty_database() {
    let conn = Connection::open_memory().unwrap();
    assert!(conn.serialize().unwrap().is_empty());
}

#[test]
fn deserialize_read_only_rejects_writes() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
    let image = conn.serialize().unwrap();

    let frozen = Connection::open_memory().unwrap();
    frozen.deserialize_into(&image, true).unwrap();
    let err = frozen
        .execute("INSERT INTO t (v) VALUES (1)", ())
        .unwrap_err();
    assert!(matches!(err, Error::SqliteFailure(..)));
}

#[test]
fn clone_is_independent() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
    conn.exec_raw("INSERT INTO t VALUES (1)").unwrap();

    let copy = conn.clone_to_memory().unwrap();
    conn.exec_raw("INSERT INTO t VALUES (2)").unwrap();
    copy.exec_raw("INSERT INTO t VALUES (3), (4)").unwrap();

    let original = conn
        .query_one("SELECT count(*) FROM t", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    let cloned = copy
        .query_one("SELECT count(*) FROM t", ())
        .unwrap()
        .unwrap()
        .get_as::<i64>(0)
        .unwrap();
    assert_eq!((original, cloned), (2, 3));
}

#[test]
fn pragma_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open_file(dir.path().join("test.db")).unwrap();

    assert_eq!(
        conn.set_journal_mode(JournalMode::Wal).unwrap(),
        JournalMode::Wal
    );
    assert_eq!(conn.journal_mode().unwrap(), JournalMode::Wal);

    assert_eq!(
        conn.set_synchronous(selenite::Synchronous::Full).unwrap(),
        selenite::Synchronous::Full
    );
    assert!(conn.set_foreign_keys(true).unwrap());
    assert_eq!(conn.set_cache_size(-2000).unwrap(), -2000);
    assert_eq!(
        conn.set_temp_store(selenite::TempStore::Memory).unwrap(),
        selenite::TempStore::Memory
    );

    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
    assert!(conn.page_count().unwrap() > 0);
    assert!(conn.freelist_count().unwrap() >= 0);
    assert_eq!(conn.encoding().unwrap(), "UTF-8");
    assert!(conn.page_size().unwrap() >= 512);
}

#[test]
fn wal_is_rejected_in_memory() {
    let conn = Connection::open_memory().unwrap();
    // The engine keeps in-memory databases on the memory journal; the
    // adopted mode is reported back instead of the requested one.
    assert_eq!(
        conn.set_journal_mode(JournalMode::Wal).unwrap(),
        JournalMode::Memory
    );
}

#[test]
fn named_parameters() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (a INTEGER, b TEXT)").unwrap();

    conn.execute(
        "INSERT INTO t (a, b) VALUES (:a, :b)",
        named_params! { ":a": 7i64, ":b": "seven" },
    )
    .unwrap();

    let mut stmt = conn.prepare("SELECT b FROM t WHERE a = :a").unwrap();
    assert_eq!(stmt.parameter_count(), 1);
    assert_eq!(stmt.parameter_index(":a").unwrap(), 1);
    assert!(stmt.parameter_index(":missing").is_err());

    let mut rows = stmt.query(vec![(":a".to_string(), 7i64)]).unwrap();
    let row = rows.next().unwrap().unwrap();
    assert_eq!(row.get_as::<String>(0).unwrap(), "seven");
}

#[test]
fn rebinding_yields_identical_rows() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();
    conn.exec_raw("INSERT INTO t VALUES (1), (2), (3)").unwrap();

    let mut stmt = conn.prepare("SELECT v FROM t WHERE v >= ?1 ORDER BY v").unwrap();
    let collect = |stmt: &mut selenite::Statement| -> Vec<i64> {
        let mut rows = stmt.query((2i64,)).unwrap();
        let mut out = Vec::new();
        while let Some(row) = rows.next().unwrap() {
            out.push(row.get_as::<i64>(0).unwrap());
        }
        out
    };
    let first = collect(&mut stmt);
    let second = collect(&mut stmt);
    assert_eq!(first, vec![2, 3]);
    assert_eq!(first, second);
}

#[test]
fn poisoned_statement_only_finalizes() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER UNIQUE)").unwrap();

    let mut stmt = conn.prepare("INSERT INTO t (v) VALUES (1)").unwrap();
    stmt.execute(()).unwrap();
    assert!(matches!(stmt.execute(()), Err(Error::SqliteFailure(..))));

    // Poisoned: stepping and resetting are refused, finalize is fine.
    assert!(stmt.step().is_err());
    assert!(stmt.reset().is_err());
    stmt.finalize().unwrap();
    stmt.finalize().unwrap();
}

#[test]
fn use_after_close() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE t (v INTEGER)").unwrap();

    conn.close().unwrap();
    conn.close().unwrap();

    assert!(matches!(
        conn.exec_raw("INSERT INTO t VALUES (1)"),
        Err(Error::ClosedHandle("connection"))
    ));
    assert!(matches!(
        conn.prepare("SELECT 1"),
        Err(Error::ClosedHandle("connection"))
    ));
}

#[test]
fn interrupt_flag() {
    let conn = Connection::open_memory().unwrap();
    assert!(!conn.is_interrupted());
    conn.interrupt();
    assert!(conn.is_interrupted());
    drop(conn);

    let conn = Connection::open_memory().unwrap();
    let handle = conn.interrupt_handle();
    std::thread::spawn(move || handle.interrupt())
        .join()
        .unwrap();
    assert!(conn.is_interrupted());

    // After close the handle goes inert instead of touching a freed engine
    // object.
    let handle = conn.interrupt_handle();
    conn.close().unwrap();
    handle.interrupt();
}

#[test]
fn value_round_trip_through_sql() {
    let conn = Connection::open_memory().unwrap();
    let cases = vec![
        Value::Null,
        Value::Integer(i64::MIN),
        Value::Integer(i64::MAX),
        Value::Real(2.5),
        Value::Text(String::new()),
        Value::Text("héllo".to_string()),
        Value::Text("with\0nul".to_string()),
        Value::Blob(Vec::new()),
        Value::Blob(vec![0x00, 0xFF, 0x7F]),
    ];
    for value in cases {
        let row = conn
            .query_one("SELECT ?1", selenite::Params::Positional(vec![value.clone()]))
            .unwrap()
            .unwrap();
        assert_eq!(row.get(0), Some(&value), "round-tripping {value:?}");
    }
}

#[test]
fn column_metadata() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();

    let stmt = conn
        .prepare("SELECT name AS the_name, 1 + 1 FROM users")
        .unwrap();
    assert_eq!(stmt.column_names(), vec!["the_name", "1 + 1"]);

    let meta = stmt.column_metadata(0);
    assert_eq!(meta.table.as_deref(), Some("users"));
    assert_eq!(meta.origin_name.as_deref(), Some("name"));
    assert_eq!(meta.database.as_deref(), Some("main"));

    let literal = stmt.column_metadata(1);
    assert_eq!(literal.table, None);
    assert_eq!(literal.origin_name, None);

    assert_eq!(stmt.columns()[0].decl_type(), Some("TEXT"));
    assert!(stmt.readonly());
}

#[test]
fn fts5_is_available() {
    let conn = Connection::open_memory().unwrap();
    conn.exec_raw("CREATE VIRTUAL TABLE docs USING fts5(body)")
        .unwrap();
    conn.execute(
        "INSERT INTO docs (body) VALUES ('the quick brown fox')",
        (),
    )
    .unwrap();
    let hits = conn
        .query("SELECT body FROM docs WHERE docs MATCH 'quick'", ())
        .unwrap();
    assert_eq!(hits.len(), 1);
}
