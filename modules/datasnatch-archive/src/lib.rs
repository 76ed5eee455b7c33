pub mod backoff;
pub mod fetcher;
pub mod store;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backoff::ExponentialBackoff;
pub use fetcher::{FetchEvent, Fetcher, FetcherConfig};
pub use store::{LoadedProfiles, Store, StoreOutcome};
pub use transport::{FetchTransport, HttpTransport, TransportResponse};
