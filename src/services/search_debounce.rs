//! Debounced search query.
//!
//! Keystrokes go in through [`SearchDebouncer::set_query`]; the query is
//! published to subscribers only once input has been quiet for the
//! configured period. Filtering itself is [`crate::types::bookmark::filter_bookmarks`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct SearchDebouncer {
    input: watch::Sender<String>,
    output: Arc<watch::Sender<String>>,
    task: JoinHandle<()>,
}

impl SearchDebouncer {
    /// Starts the debounce task. Must be called inside a tokio runtime.
    pub fn new(quiet: Duration) -> Self {
        let (input, mut input_rx) = watch::channel(String::new());
        let (output, _) = watch::channel(String::new());
        let output = Arc::new(output);
        let publisher = Arc::clone(&output);

        let task = tokio::spawn(async move {
            while input_rx.changed().await.is_ok() {
                // Restart the quiet period on every new keystroke.
                loop {
                    tokio::select! {
                        changed = input_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        _ = tokio::time::sleep(quiet) => break,
                    }
                }

                let settled = input_rx.borrow_and_update().clone();
                publisher.send_if_modified(|current| {
                    if *current == settled {
                        false
                    } else {
                        *current = settled;
                        true
                    }
                });
            }
        });

        Self {
            input,
            output,
            task,
        }
    }

    /// Records the latest raw query. Never blocks.
    pub fn set_query(&self, query: impl Into<String>) {
        self.input.send_replace(query.into());
    }

    /// The last settled query.
    pub fn current(&self) -> String {
        self.output.borrow().clone()
    }

    /// Observes settled queries.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.output.subscribe()
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
