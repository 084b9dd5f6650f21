use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use synced_doc::{Document, SyncedDocument, TomlCodec};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
struct Counter {
    value: u32,
}

impl Document for Counter {}

fn doc_at(path: &Path) -> SyncedDocument<Counter, TomlCodec> {
    SyncedDocument::new(path, Counter::default(), TomlCodec)
        .with_settle_delay(Duration::from_millis(300))
        .with_debounce(Duration::from_millis(50))
}

fn wait_for(hits: &AtomicUsize, at_least: usize) -> bool {
    for _ in 0..100 {
        if hits.load(Ordering::SeqCst) >= at_least {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn own_saves_do_not_trigger_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.toml");
    let doc = doc_at(&path);
    doc.load().unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _watch = doc
        .watch(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    for n in 1..=5 {
        doc.update(|c| c.value = n);
        doc.save().unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    thread::sleep(Duration::from_millis(800));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn external_edit_triggers_one_reload_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.toml");
    let doc = doc_at(&path);
    doc.load().unwrap();
    thread::sleep(Duration::from_millis(400));

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let _watch = doc
        .watch(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    fs::write(&path, "value = 7\n").unwrap();
    assert!(wait_for(&hits, 1), "external edit was not reported");

    doc.load().unwrap();
    assert_eq!(doc.get().value, 7);
}
