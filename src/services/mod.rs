pub mod enrichment;
pub mod normalizing;
pub mod persistence;
pub mod pipeline;
pub mod reconciling;
pub mod text_utils;

pub use enrichment::Enrichment;
pub use normalizing::Normalizer;
pub use persistence::{PersistenceGateway, StaleSweep, UpsertOutcome};
pub use pipeline::{run_pipeline, Pipeline, PlatformFetch};
pub use reconciling::Reconciler;
pub use text_utils::{TitleFilter, TitleNormalizer};
