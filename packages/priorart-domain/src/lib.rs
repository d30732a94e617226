pub mod candidate;
pub mod disclosure;
pub mod predicate;
pub mod quality;
pub mod reduce;
pub mod selection;
pub mod strategy;

mod domain;

pub use candidate::{Provenance, SearchCandidate, SearchEnvelope, SearchPage};
pub use disclosure::Disclosure;
pub use domain::{Domain, ParseDomainError};
pub use predicate::{FieldOp, Predicate};
pub use quality::{Assessment, QualityThresholds, Refinement, RefinementStep};
pub use selection::{Decision, DomainPolicy, Judgment, RankedResult};
pub use strategy::{PaperQuery, PatentQuery};
