pub mod atom;
pub mod config;
pub mod density;
pub mod domain;
pub mod node;
pub mod range;
pub mod sample;
pub mod simplify;

pub use atom::{AtomId, Family, Param};
pub use config::EngineConfig;
pub use density::Density;
pub use node::{Dag, Node, NodeId};
pub use range::range_est;
pub use sample::{ExactSampler, MarginalSampler};
pub use stochbb_error::{StochError, StochResult};

pub mod prelude {
    pub use super::atom::{AtomId, Family, Param};
    pub use super::config::EngineConfig;
    pub use super::density::Density;
    pub use super::domain::random_provider;
    pub use super::node::{Dag, Node, NodeId};
    pub use super::range::range_est;
    pub use super::sample::{ExactSampler, MarginalSampler};
    pub use stochbb_error::{StochError, StochResult};
}
