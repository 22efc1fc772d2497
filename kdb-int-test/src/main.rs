use kdb::common::{Context, Limit};
use kdb::errors::KdbResult;
use kdb_int_test::test_util::{cleanup, create_test_context, default_backend};

fn main() -> KdbResult<()> {
    colog::init();
    let backend = default_backend();
    println!("Starting {} walkthrough...", backend);
    let test_ctx = create_test_context(backend)?;
    let store = test_ctx.store();
    let ctx = Context::background();

    for i in 1..=3 {
        let key = format!("key{}", i);
        store.put(&ctx, key.as_bytes(), format!("value{}", i).as_bytes())?;
    }
    store.flush_puts(&ctx)?;

    let mut keys = Vec::new();
    let mut iter = store.prefix(&ctx, b"key", Limit::new(3), &[]);
    while iter.next() {
        let kv = iter.take_item();
        println!(
            "{} = {}",
            String::from_utf8_lossy(&kv.key),
            String::from_utf8_lossy(&kv.value)
        );
        keys.push(kv.key);
    }
    if let Some(err) = iter.err() {
        println!("prefix scan failed: {}", err);
    }

    store.batch_delete(&ctx, &keys)?;
    match store.get(&ctx, b"key1") {
        Ok(value) => println!("key1 still present: {}", String::from_utf8_lossy(&value)),
        Err(err) if err.is_not_found() => println!("key1 deleted"),
        Err(err) => return Err(err),
    }

    let count = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<usize>().ok())
        .unwrap_or(100_000);
    let start = std::time::Instant::now();
    for _ in 0..count {
        let key = format!("load/{}", uuid::Uuid::new_v4());
        store.put(&ctx, key.as_bytes(), uuid::Uuid::new_v4().as_bytes())?;
    }
    store.flush_puts(&ctx)?;
    println!("Inserted {} keys in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    let scanned = store
        .prefix(&ctx, b"load/", Limit::UNBOUNDED, &[])
        .drain()?
        .len();
    println!("Scanned {} keys in {:?}", scanned, start.elapsed());

    cleanup(test_ctx)
}
