use kdb::common::{Context, Limit, ReadOption, StoreOption};
use kdb::errors::{ErrorKind, KdbResult};
use kdb_int_test::test_util::{load, run_on_all_backends, sorted_keys, value_of};
use std::thread;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_put_prefix_delete_walkthrough() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["key1", "key2", "key3"])?;

        let items = store.prefix(&op, b"key", Limit::new(3), &[]).drain()?;
        assert_eq!(sorted_keys(&items), vec!["key1", "key2", "key3"]);
        for kv in &items {
            let key = String::from_utf8_lossy(&kv.key).to_string();
            assert_eq!(kv.value, value_of(&key).into_bytes());
        }

        let keys: Vec<Vec<u8>> = items.into_iter().map(|kv| kv.key).collect();
        store.batch_delete(&op, &keys)?;
        let err = store.get(&op, b"key1").unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    });
}

#[test]
fn test_puts_are_invisible_until_flushed() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        store.put(&op, b"staged", b"value")?;
        assert!(store.get(&op, b"staged").unwrap_err().is_not_found());

        store.flush_puts(&op)?;
        assert_eq!(store.get(&op, b"staged")?, b"value".to_vec());
        Ok(())
    });
}

#[test]
fn test_last_put_wins() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        store.put(&op, b"key", b"first")?;
        store.put(&op, b"key", b"second")?;
        store.flush_puts(&op)?;
        assert_eq!(store.get(&op, b"key")?, b"second".to_vec());
        Ok(())
    });
}

#[test]
fn test_prefix_honours_limit() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["p/1", "p/2", "p/3", "p/4", "p/5", "q/1"])?;

        let bounded = store.prefix(&op, b"p/", Limit::new(2), &[]).drain()?;
        assert_eq!(bounded.len(), 2);
        assert!(bounded.iter().all(|kv| kv.key.starts_with(b"p/")));

        let all = store.prefix(&op, b"p/", Limit::UNBOUNDED, &[]).drain()?;
        assert_eq!(sorted_keys(&all), vec!["p/1", "p/2", "p/3", "p/4", "p/5"]);
        Ok(())
    });
}

#[test]
fn test_scan_is_half_open() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["a", "b", "c", "d"])?;

        let items = store.scan(&op, b"b", b"d", Limit::UNBOUNDED, &[]).drain()?;
        assert_eq!(sorted_keys(&items), vec!["b", "c"]);
        if ctx.backend().is_ordered() {
            assert_eq!(items[0].key, b"b".to_vec());
            assert_eq!(items[1].key, b"c".to_vec());
        }

        let inverted = store.scan(&op, b"d", b"b", Limit::UNBOUNDED, &[]).drain()?;
        assert!(inverted.is_empty());
        Ok(())
    });
}

#[test]
fn test_key_only_reads_skip_values() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["k1", "k2"])?;

        let items = store
            .prefix(&op, b"k", Limit::UNBOUNDED, &[ReadOption::KeyOnly])
            .drain()?;
        assert_eq!(sorted_keys(&items), vec!["k1", "k2"]);
        assert!(items.iter().all(|kv| kv.value.is_empty()));
        Ok(())
    });
}

#[test]
fn test_batch_get_follows_request_order() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["x", "y", "z"])?;

        let keys = vec![b"z".to_vec(), b"x".to_vec()];
        let items = store.batch_get(&op, &keys).drain()?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, b"z".to_vec());
        assert_eq!(items[0].value, value_of("z").into_bytes());
        assert_eq!(items[1].key, b"x".to_vec());
        Ok(())
    });
}

#[test]
fn test_batch_get_fails_on_missing_key() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        load(store, &op, &["x"])?;

        let keys = vec![b"x".to_vec(), b"missing".to_vec()];
        let err = store.batch_get(&op, &keys).drain().unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    });
}

#[test]
fn test_empty_value_with_option() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        store.apply_option(&StoreOption::EmptyValue)?;
        store.put(&op, b"empty", b"")?;
        store.flush_puts(&op)?;
        assert!(store.get(&op, b"empty")?.is_empty());
        Ok(())
    });
}

#[test]
fn test_close_is_idempotent() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::background();
        store.put(&op, b"key", b"value")?;
        store.close()?;
        store.close()?;
        assert!(store.is_closed());

        let err = store.get(&op, b"key").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::StoreClosed);
        let mut iter = store.prefix(&op, b"", Limit::UNBOUNDED, &[]);
        assert!(!iter.next());
        assert_eq!(iter.err().unwrap().kind(), &ErrorKind::StoreClosed);
        Ok(())
    });
}

#[test]
fn test_concurrent_writers() {
    run_on_all_backends(|ctx| {
        let writers = 4;
        let per_writer = 50;
        let handles: Vec<_> = (0..writers)
            .map(|writer| {
                let store = ctx.store().clone();
                thread::spawn(move || -> KdbResult<()> {
                    let op = Context::background();
                    for i in 0..per_writer {
                        let key = format!("w{}/{:03}", writer, i);
                        store.put(&op, key.as_bytes(), b"payload")?;
                    }
                    store.flush_puts(&op)
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap()?;
        }

        let op = Context::background();
        let items = ctx
            .store()
            .prefix(&op, b"w", Limit::UNBOUNDED, &[ReadOption::KeyOnly])
            .drain()?;
        assert_eq!(items.len(), writers * per_writer);
        Ok(())
    });
}
