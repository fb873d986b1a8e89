// Media resolution module
//
// Turns a social/media platform page URL into one playable media item:
// classify -> strategy chain (extract + validate) -> normalize -> deliver.

pub mod chain;
pub mod delivery;
pub mod errors;
pub mod extractors;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod platform;
pub mod profiles;
pub mod temp_store;
pub mod traits;
pub mod utils;
pub mod validator;

pub use chain::{ChainResolver, ExtractorRegistry, ResolvedCandidate};
pub use delivery::{DeliveredMedia, DeliveryProxy, MediaBody};
pub use errors::{DeliveryError, ExtractError, FailureClass, PipelineError, ResolveError};
pub use models::{MediaCandidate, MediaClass, MediaResult, MediaSource, StrategyKind};
pub use pipeline::MediaPipeline;
pub use platform::{classify, Platform};
pub use temp_store::{TempAsset, TempAssetStore};
pub use traits::Extractor;
pub use validator::CandidateValidator;
