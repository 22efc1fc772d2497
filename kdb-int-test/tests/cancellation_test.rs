use kdb::common::{Context, Limit};
use kdb::errors::ErrorKind;
use kdb::store::IteratorState;
use kdb_int_test::test_util::run_on_all_backends;
use std::thread;
use std::time::Duration;

#[ctor::ctor]
fn init() {
    colog::init();
}

fn load_many(store: &kdb::store::Store, count: usize) -> kdb::errors::KdbResult<()> {
    let op = Context::background();
    for i in 0..count {
        let key = format!("item/{:05}", i);
        store.put(&op, key.as_bytes(), b"payload")?;
    }
    store.flush_puts(&op)
}

#[test]
fn test_cancel_stops_iteration() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        load_many(store, 500)?;

        let op = Context::background();
        let mut iter = store.prefix(&op, b"item/", Limit::UNBOUNDED, &[]);
        assert!(iter.next());
        op.cancel();

        let mut delivered = 1;
        while iter.next() {
            delivered += 1;
        }
        assert!(delivered < 500);
        assert_eq!(iter.state(), IteratorState::Cancelled);
        assert!(iter.err().is_none());
        Ok(())
    });
}

#[test]
fn test_abandoned_iterator_does_not_block_writers() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        load_many(store, 500)?;

        let op = Context::background();
        let mut iter = store.prefix(&op, b"item/", Limit::UNBOUNDED, &[]);
        assert!(iter.next());
        drop(iter);

        store.put(&op, b"after", b"value")?;
        store.flush_puts(&op)?;
        assert_eq!(store.get(&op, b"after")?, b"value".to_vec());
        Ok(())
    });
}

#[test]
fn test_expired_deadline_fails_operations() {
    run_on_all_backends(|ctx| {
        let store = ctx.store();
        let op = Context::with_timeout(Duration::from_millis(50));
        awaitility::at_most(Duration::from_secs(5)).until(|| op.is_expired());

        let err = store.get(&op, b"key").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DeadlineExceeded);
        let err = store.put(&op, b"key", b"value").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DeadlineExceeded);

        let err = store
            .prefix(&op, b"", Limit::UNBOUNDED, &[])
            .drain()
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DeadlineExceeded);
        Ok(())
    });
}

#[test]
fn test_write_from_another_thread_becomes_visible() {
    run_on_all_backends(|ctx| {
        let writer = ctx.store().clone();
        let handle = thread::spawn(move || {
            let op = Context::background();
            thread::sleep(Duration::from_millis(20));
            writer.put(&op, b"late", b"arrival")?;
            writer.flush_puts(&op)
        });

        let store = ctx.store();
        let op = Context::background();
        awaitility::at_most(Duration::from_secs(5)).until(|| store.get(&op, b"late").is_ok());
        handle.join().unwrap()?;
        assert_eq!(store.get(&op, b"late")?, b"arrival".to_vec());
        Ok(())
    });
}
