mod listing;
mod manifest;
mod offer;
mod platform;
pub(crate) mod rates;
mod report;
pub(crate) mod storage;

pub use listing::GameListing;
pub use manifest::{Manifest, ManifestMetadata};
pub use offer::{GameMetadata, GameOffer, Pricing, RawAmount, RawOffer, RawPrice};
pub use platform::Platform;
pub use rates::ExchangeRates;
pub use report::{Failure, FailureSubject, RunReport, RunState};
pub use storage::{ListingStore, StorageKeys};
