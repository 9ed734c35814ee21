// Concurrent Access Tests for StrataDb
// These tests verify thread-safety and concurrent access patterns

use stratadb::{Options, DB};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn small_options() -> Options {
    Options::default()
        .heap_budget(64 * 1024)
        .compaction_threshold(4)
        .sync_on_publish(false)
}

/// Test concurrent writes from multiple threads
#[test]
fn test_concurrent_writes() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), small_options()).unwrap());

    let num_threads = 8;
    let writes_per_thread = 200;

    let mut handles = vec![];

    for thread_id in 0..num_threads {
        let db_clone = Arc::clone(&db);
        let handle = thread::spawn(move || {
            for i in 0..writes_per_thread {
                let key = format!("thread_{}_key_{:04}", thread_id, i);
                let value = format!("thread_{}_value_{}", thread_id, i);
                db_clone.upsert(key.as_bytes(), value.as_bytes()).unwrap();
            }
        });
        handles.push(handle);
    }

    // Wait for all threads to complete
    for handle in handles {
        handle.join().unwrap();
    }

    // Verify all writes succeeded
    for thread_id in 0..num_threads {
        for i in 0..writes_per_thread {
            let key = format!("thread_{}_key_{:04}", thread_id, i);
            let value = format!("thread_{}_value_{}", thread_id, i);
            assert_eq!(db.get(key.as_bytes()).unwrap().unwrap(), value.as_bytes());
        }
    }
    assert_eq!(db.iter().unwrap().count(), num_threads * writes_per_thread);
}

/// Concurrent writers to the same key: the last write in lock order wins
#[test]
fn test_concurrent_same_key() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), small_options()).unwrap());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|thread_id| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..100 {
                    let value = format!("{}:{}", thread_id, i);
                    db.upsert(b"shared", value.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Some thread's final write is the visible one
    let value = db.get(b"shared").unwrap().unwrap();
    let value = String::from_utf8(value.to_vec()).unwrap();
    assert!(value.ends_with(":99"), "unexpected final value {}", value);
}

/// Readers and scanners run while a writer flushes and compacts
#[test]
fn test_concurrent_reads_during_writes() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), small_options()).unwrap());

    // Preload stable keys that never change
    for i in 0..100 {
        let key = format!("stable_{:03}", i);
        db.upsert(key.as_bytes(), b"fixed").unwrap();
    }

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));

    let writer = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2_000 {
                let key = format!("volatile_{:05}", i);
                db.upsert(key.as_bytes(), &[b'v'; 64]).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            let done = Arc::clone(&done);
            let reads = Arc::clone(&reads);
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    for i in (0..100).step_by(7) {
                        let key = format!("stable_{:03}", i);
                        assert_eq!(db.get(key.as_bytes()).unwrap().unwrap(), "fixed");
                    }
                    let stable = db
                        .scan(b"stable_")
                        .unwrap()
                        .map(|r| r.unwrap())
                        .filter(|(k, _)| k.starts_with(b"stable_"))
                        .count();
                    assert_eq!(stable, 100);
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(db.sstable_count() <= 4);
    assert_eq!(db.iter().unwrap().count(), 2_100);
}

/// Flush and compact from several threads at once
#[test]
fn test_concurrent_flush_and_compact() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), small_options()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|thread_id| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("t{}_{:03}", thread_id, i);
                    db.upsert(key.as_bytes(), b"v").unwrap();
                    if i % 10 == 0 {
                        db.flush().unwrap();
                    }
                    if i % 25 == 0 {
                        db.compact().unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.iter().unwrap().count(), 200);
}
