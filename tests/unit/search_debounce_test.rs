//! Unit tests for SearchDebouncer. Time is paused so the quiet period is exact.

use std::time::Duration;

use smartmark::services::search_debounce::SearchDebouncer;

const QUIET: Duration = Duration::from_millis(200);

#[tokio::test(start_paused = true)]
async fn test_query_settles_after_quiet_period() {
    let search = SearchDebouncer::new(QUIET);

    search.set_query("rust");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(search.current(), "");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(search.current(), "rust");
}

/// Each keystroke restarts the quiet period; only the last query is published.
#[tokio::test(start_paused = true)]
async fn test_rapid_typing_publishes_only_final_query() {
    let search = SearchDebouncer::new(QUIET);
    let mut settled = search.subscribe();

    for partial in ["g", "gi", "git", "gith", "githu", "github"] {
        search.set_query(partial);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(search.current(), "");

    settled.changed().await.unwrap();
    assert_eq!(*settled.borrow_and_update(), "github");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!settled.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_same_query_is_not_republished() {
    let search = SearchDebouncer::new(QUIET);
    let mut settled = search.subscribe();

    search.set_query("hub");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(settled.has_changed().unwrap());
    settled.borrow_and_update();

    search.set_query("hu");
    search.set_query("hub");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!settled.has_changed().unwrap());
    assert_eq!(search.current(), "hub");
}

#[tokio::test(start_paused = true)]
async fn test_clearing_query_settles_to_empty() {
    let search = SearchDebouncer::new(QUIET);

    search.set_query("hub");
    tokio::time::sleep(Duration::from_millis(300)).await;
    search.set_query("");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(search.current(), "");
}
