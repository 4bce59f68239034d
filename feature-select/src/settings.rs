use crate::{
    FeatureSelectLimit, SelectBest, SelectEveryNth, SelectFirst, SelectPoint, SelectRandom,
    SelectUniform, SelectUniformBest,
};
use rand::SeedableRng;
use rand_pcg::Pcg64;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The selection strategies.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SelectLimitType {
    /// [`SelectFirst`]
    First,
    /// [`SelectEveryNth`]
    EveryNth,
    /// [`SelectBest`]
    Best,
    /// [`SelectRandom`]
    Random,
    /// [`SelectUniform`]
    Uniform,
    /// [`SelectUniformBest`]
    UniformBest,
}

/// Chooses and configures a selection strategy.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SelectLimitSettings {
    /// The strategy
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_kind"))]
    pub kind: SelectLimitType,
    /// The seed of the random number generator used by the random strategy
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_seed"))]
    pub seed: u64,
}

impl SelectLimitSettings {
    /// Creates the configured strategy.
    pub fn build<P: SelectPoint + 'static>(&self) -> Box<dyn FeatureSelectLimit<P>> {
        match self.kind {
            SelectLimitType::First => Box::new(SelectFirst),
            SelectLimitType::EveryNth => Box::new(SelectEveryNth),
            SelectLimitType::Best => Box::new(SelectBest::new()),
            SelectLimitType::Random => Box::new(SelectRandom::new(Pcg64::seed_from_u64(self.seed))),
            SelectLimitType::Uniform => Box::new(SelectUniform::new()),
            SelectLimitType::UniformBest => Box::new(SelectUniformBest::new()),
        }
    }
}

impl Default for SelectLimitSettings {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            seed: default_seed(),
        }
    }
}

fn default_kind() -> SelectLimitType {
    SelectLimitType::UniformBest
}

fn default_seed() -> u64 {
    0
}
