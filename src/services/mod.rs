// SmartMark services
// Services are the collaborators behind the sync controller: auth, storage,
// change feeds, settings and search input.

pub mod auth;
pub mod bookmark_store;
pub mod change_feed;
#[cfg(feature = "rest")]
pub mod rest_store;
pub mod search_debounce;
pub mod settings_engine;
