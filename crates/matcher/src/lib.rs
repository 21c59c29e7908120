//! `linkage-matcher`: policy renewal and claim linkage engine.
//!
//! Links successive insurance policies on the same property into continuous
//! coverage stints, then attaches each claim to the unique policy in force on
//! its date of loss. The engine itself works on pre-loaded records; `load`
//! and `output` handle the CSV/JSON edges.

pub mod canonical;
pub mod claims;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod load;
pub mod model;
pub mod output;
pub mod renewal;
pub mod selection;
pub mod stint;
pub mod summary;

pub use config::MatchConfig;
pub use engine::run;
pub use error::MatchError;
pub use model::{JurisdictionResult, LinkageInput, LinkageSummary, Outcome};
