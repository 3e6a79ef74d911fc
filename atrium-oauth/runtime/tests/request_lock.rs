mod common;

use atrium_oauth_runtime::{LocalLock, Runtime};
use common::WarningCounter;
use tracing_subscriber::layer::SubscriberExt;

fn warnings(f: impl FnOnce()) -> usize {
    let counter = WarningCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    tracing::subscriber::with_default(subscriber, f);
    counter.count("atrium_oauth_runtime")
}

#[test]
fn warns_once_without_lock() {
    let warnings = warnings(|| {
        let runtime = Runtime::<LocalLock>::new(None);
        // using the runtime does not warn again
        let _ = runtime.get_random_values(16);
        let _ = runtime.create_key(&["ES256K"]);
    });
    assert_eq!(warnings, 1);
}

#[test]
fn no_warning_with_lock() {
    let warnings = warnings(|| {
        let runtime = Runtime::new(Some(LocalLock::default()));
        assert!(runtime.has_lock());
    });
    assert_eq!(warnings, 0);
}

#[tokio::test]
async fn lock_runs_critical_section() {
    let runtime = Runtime::new(Some(LocalLock::default()));
    let first = runtime.request_lock("did:plc:alice", async { 1 }).await.expect("lock failed");
    // the guard of the first section has been released
    let second = runtime.request_lock("did:plc:alice", async { 2 }).await.expect("lock failed");
    assert_eq!((first, second), (1, 2));
}
