mod common;
use common::*;

use std::sync::Arc;

use lazyrow::{Error, Key, Record, RecordMeta};
use lazyrow_store::{Call, ColumnOrSuperColumn, ConsistencyLevel};
use rand::Rng;
use rand::seq::SliceRandom;

// ── Save lifecycle ──────────────────────────────────────────────

#[test]
fn set_save_delete_save() {
    let c = client();
    let mut r = user(&c, &users(), "u1");
    r.set("name", "Joe").unwrap();
    r.save(None).unwrap();

    let writes = c.storage().take_calls();
    assert_eq!(writes.len(), 1);
    let Call::BatchInsert { row, mutation, .. } = &writes[0] else {
        panic!("expected a batch insert, got {:?}", writes[0]);
    };
    assert_eq!(row, "u1");
    let entries = &mutation["users"];
    assert_eq!(entries.len(), 1);
    let ColumnOrSuperColumn::Column(column) = &entries[0] else {
        panic!("expected a plain column");
    };
    assert_eq!(column.name, "name");
    assert_eq!(column.value, b"Joe");

    assert!(r.delete("name"));
    let diff = r.marshal();
    assert!(diff.changed.is_empty());
    assert_eq!(diff.deleted.len(), 1);
    r.save(None).unwrap();

    let writes = c.storage().take_calls();
    assert_eq!(writes.len(), 1);
    let Call::Remove { path, .. } = &writes[0] else {
        panic!("expected a remove, got {:?}", writes[0]);
    };
    assert_eq!(path.column.as_deref(), Some("name"));
    assert_eq!(path.column_family, "users");
}

#[test]
fn clean_save_issues_no_calls() {
    let c = client();
    let mut r = user(&c, &users(), "u1");
    r.set("name", "Joe").unwrap();
    r.save(None).unwrap();
    c.storage().take_calls();

    r.save(None).unwrap();
    assert!(c.storage().calls().is_empty());

    let mut loaded = Record::new(c.clone(), users());
    loaded.load_row("u1", None).unwrap();
    c.storage().take_calls();
    loaded.save(None).unwrap();
    assert!(c.storage().calls().is_empty());
}

#[test]
fn load_reads_back_saved_columns() {
    let c = client();
    let meta = users();
    let mut r = user(&c, &meta, "u1");
    r.update([("name", "Joe"), ("email", "joe@example.com")]).unwrap();
    r.save(None).unwrap();

    let mut loaded = Record::new(c.clone(), meta);
    loaded.load_row("u1", None).unwrap();
    assert!(!loaded.is_modified());
    assert_eq!(loaded.get_str("name"), Some("Joe"));
    assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["email", "name"]);
}

#[test]
fn load_of_missing_row_is_no_such_record() {
    let c = client();
    let mut r = Record::new(c.clone(), users());
    assert!(matches!(r.load_row("ghost", None), Err(Error::NoSuchRecord(_))));
}

#[test]
fn remove_deletes_the_row_and_resets() {
    let c = client();
    let meta = users();
    let mut r = user(&c, &meta, "u1");
    r.set("name", "Joe").unwrap();
    r.save(None).unwrap();
    c.storage().take_calls();

    r.remove(None).unwrap();
    assert!(r.is_empty());
    let writes = c.storage().writes();
    assert_eq!(writes.len(), 1);
    let Call::Remove { path, .. } = &writes[0] else {
        panic!("expected a remove");
    };
    assert!(path.column.is_none());

    let mut gone = Record::new(c.clone(), meta);
    assert!(gone.load_row("u1", None).is_err());
}

#[test]
fn primary_failure_leaves_record_dirty() {
    let c = client();
    c.storage().fail_writes_to("u1");
    let mut r = user(&c, &users(), "u1");
    r.set("name", "Joe").unwrap();
    assert!(matches!(r.save(None), Err(Error::Store(_))));
    assert!(r.is_modified());
}

// ── Consistency ─────────────────────────────────────────────────

#[test]
fn consistency_resolution_order() {
    let c = client();
    let meta = RecordMeta::builder(KS, "users")
        .consistency(ConsistencyLevel::Quorum)
        .build();

    let mut r = user(&c, &meta, "u1");
    r.set("name", "Joe").unwrap();
    r.save(None).unwrap();
    assert_eq!(c.storage().take_calls()[0].consistency(), ConsistencyLevel::Quorum);

    r.set("name", "Ann").unwrap();
    r.save(Some(ConsistencyLevel::All)).unwrap();
    assert_eq!(c.storage().take_calls()[0].consistency(), ConsistencyLevel::All);

    let mut plain = user(&c, &users(), "u2");
    plain.set("name", "Bea").unwrap();
    plain.save(None).unwrap();
    assert_eq!(c.storage().take_calls()[0].consistency(), ConsistencyLevel::One);
}

// ── Diff invariants ─────────────────────────────────────────────

fn persisted(c: &lazyrow::Client<Store>, names: &[String]) -> Record<Store> {
    let mut r = user(c, &users(), "fixture");
    for name in names {
        r.set(name, format!("v-{name}")).unwrap();
    }
    r.save(None).unwrap();
    r
}

#[test]
fn random_edits_keep_diff_consistent() {
    let c = client();
    let mut rng = rand::thread_rng();
    let names: Vec<String> = (0..12).map(|i| format!("col{i:02}")).collect();
    let mut r = persisted(&c, &names[..6]);

    for _ in 0..200 {
        let name = names.choose(&mut rng).unwrap();
        if rng.gen_bool(0.5) {
            r.set(name, format!("x{}", rng.gen_range(0..3))).unwrap();
        } else {
            r.delete(name);
        }

        let diff = r.marshal();
        for column in &diff.changed {
            assert!(
                diff.deleted.iter().all(|p| p.column.as_deref() != Some(column.name.as_str())),
                "{} is both changed and deleted",
                column.name
            );
        }
        for path in &diff.deleted {
            let name = path.column.as_deref().unwrap();
            assert!(names[..6].iter().any(|n| n == name), "{name} was never persisted");
        }
    }
}

#[test]
fn copy_on_write_keeps_original_intact() {
    let c = client();
    let names = vec!["name".to_string()];
    let original = persisted(&c, &names);
    let key = original.key().cloned().unwrap();

    let mut r = Record::new(c.clone(), users());
    r.load(key, None).unwrap();
    r.set("name", "changed").unwrap();
    let before = r.original_column("name").unwrap();
    let after = r.current_column("name").unwrap();
    assert!(!Arc::ptr_eq(before, after));
    assert_eq!(before.value, b"v-name");

    r.revert();
    assert_eq!(r.get_str("name"), Some("v-name"));
    assert!(!r.is_modified());
}

#[test]
fn saved_super_column_record_round_trips_through_its_key() {
    let c = client();
    let meta = RecordMeta::builder(KS, "prefs").build();
    let mut r = Record::new(c.clone(), Arc::clone(&meta));
    r.set_key("u1", Some("theme")).unwrap();
    r.set("color", "dark").unwrap();
    r.save(None).unwrap();

    let mut loaded = Record::new(c.clone(), meta);
    loaded
        .load(Key::row(KS, "prefs", "u1").unwrap().with_super_column("theme"), None)
        .unwrap();
    assert_eq!(loaded.get_str("color"), Some("dark"));
}
