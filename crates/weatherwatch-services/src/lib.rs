//! State and data flow behind the Weather Watch screen: debounced search,
//! the query cache with prefix invalidation, and the persisted stores.

pub mod debounce;
pub mod invalidation;
pub mod location_store;
pub mod observer;
pub mod persistence;
pub mod query_cache;
pub mod query_key;
pub mod search;
pub mod unit_store;

pub use debounce::Debouncer;
pub use invalidation::{Invalidate, InvalidationCoordinator, InvalidationEvent};
pub use location_store::LocationStore;
pub use observer::{QueryObserver, QueryState};
pub use persistence::{JsonFileStore, MemoryStore, Persistence};
pub use query_cache::{
    EntrySnapshot, FetchStatus, QueryCache, QueryFn, QueryFuture, QueryResult, DEFAULT_GC_TIME,
    DEFAULT_STALE_TIME,
};
pub use query_key::{current_key, search_key, weather_prefix, QueryKey};
pub use search::{SearchCache, SearchEngine, SearchState};
pub use unit_store::{Preferences, UnitPreferenceStore};
