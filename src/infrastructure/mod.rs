pub mod adapters;
mod cancel;
mod http;
mod rates;
mod storage;

pub use adapters::{
    build_adapter, gamersgate::GamersGateAdapter, gog::GogAdapter, nuuvem::NuuvemAdapter,
    pages::{fetch_entry, EntryFetch, OfferPages},
    steam::SteamAdapter,
    AdapterRegistry, PageContext, ParsedPage, StorefrontAdapter,
};
pub use cancel::CancelSignal;
pub use http::{retry_with_backoff, PageFetcher, RetryPolicy};
pub use rates::StaticRates;
pub use storage::{FileSystemStore, MemoryStore};
