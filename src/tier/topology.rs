//! Declarative tier topology
//!
//! Each entry says when a tier is encoded, when it is residual-coded against
//! its base and verified, and at what resolution it is produced. The default
//! table reproduces the CR/SR/HR cascade; a custom one can be loaded from the
//! configuration file.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FomaError, Result};
use crate::tier::{SourceProperties, TierName};

/// Predicate over the source properties and the tiers encoded so far
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    #[default]
    Never,
    RateAbove(u32),
    RateAtMost(u32),
    RateEquals(u32),
    DepthAbove(u16),
    DepthAtLeast(u16),
    /// True when an earlier entry of the table was encoded
    TierEncoded(TierName),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    /// Evaluate against a source; `encoded` holds the tiers already chosen
    pub fn evaluate(&self, source: &SourceProperties, encoded: &HashSet<TierName>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::RateAbove(rate) => source.sample_rate > *rate,
            Condition::RateAtMost(rate) => source.sample_rate <= *rate,
            Condition::RateEquals(rate) => source.sample_rate == *rate,
            Condition::DepthAbove(depth) => source.bit_depth > *depth,
            Condition::DepthAtLeast(depth) => source.bit_depth >= *depth,
            Condition::TierEncoded(name) => encoded.contains(name),
            Condition::All(conds) => conds.iter().all(|c| c.evaluate(source, encoded)),
            Condition::Any(conds) => conds.iter().any(|c| c.evaluate(source, encoded)),
        }
    }

    fn referenced_tiers<'a>(&'a self, out: &mut Vec<&'a TierName>) {
        match self {
            Condition::TierEncoded(name) => out.push(name),
            Condition::All(conds) | Condition::Any(conds) => {
                for c in conds {
                    c.referenced_tiers(out);
                }
            }
            _ => {}
        }
    }
}

/// Either the source's own value or a fixed target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution<T> {
    Native,
    Fixed(T),
}

impl<T: Copy> Resolution<T> {
    pub fn resolve(&self, native: T) -> T {
        match self {
            Resolution::Native => native,
            Resolution::Fixed(value) => *value,
        }
    }
}

/// One row of the topology table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: TierName,
    /// When the tier file is produced
    pub encode_when: Condition,
    /// When the tier is residual-coded against `base` and verified
    #[serde(default)]
    pub verify_when: Condition,
    pub sample_rate: Resolution<u32>,
    pub bit_depth: Resolution<u16>,
    #[serde(default)]
    pub base: Option<TierName>,
}

/// Ordered, validated tier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierSpec>", into = "Vec<TierSpec>")]
pub struct Topology {
    specs: Vec<TierSpec>,
}

impl Default for Topology {
    fn default() -> Self {
        use Condition::*;

        let hr = TierSpec {
            name: TierName::hr(),
            encode_when: Any(vec![RateAbove(48000), DepthAbove(24)]),
            verify_when: All(vec![RateAbove(48000), DepthAtLeast(24)]),
            sample_rate: Resolution::Native,
            bit_depth: Resolution::Native,
            base: Some(TierName::sr()),
        };
        // 44.1 kHz only qualifies at 24-bit and above, 48 kHz always does
        let sr = TierSpec {
            name: TierName::sr(),
            encode_when: Any(vec![
                TierEncoded(TierName::hr()),
                RateEquals(48000),
                All(vec![RateEquals(44100), DepthAtLeast(24)]),
            ]),
            verify_when: Any(vec![
                All(vec![RateAtMost(48000), DepthAtLeast(24)]),
                RateAbove(48000),
            ]),
            sample_rate: Resolution::Fixed(48000),
            bit_depth: Resolution::Fixed(24),
            base: Some(TierName::cr()),
        };
        let cr = TierSpec {
            name: TierName::cr(),
            encode_when: Always,
            verify_when: Never,
            sample_rate: Resolution::Fixed(48000),
            bit_depth: Resolution::Fixed(16),
            base: None,
        };

        Self {
            specs: vec![hr, sr, cr],
        }
    }
}

impl TryFrom<Vec<TierSpec>> for Topology {
    type Error = FomaError;

    fn try_from(specs: Vec<TierSpec>) -> Result<Self> {
        Topology::new(specs)
    }
}

impl From<Topology> for Vec<TierSpec> {
    fn from(topology: Topology) -> Self {
        topology.specs
    }
}

impl Topology {
    /// Build and validate a topology
    ///
    /// # Errors
    /// `InvalidTopology` for duplicate names, unknown or cyclic bases,
    /// forward `tier_encoded` references, or a verified tier without a base.
    pub fn new(specs: Vec<TierSpec>) -> Result<Self> {
        let invalid = |reason: String| FomaError::InvalidTopology { reason };

        if specs.is_empty() {
            return Err(invalid("topology has no tiers".to_string()));
        }

        let mut seen: HashSet<&TierName> = HashSet::new();
        for spec in &specs {
            let mut refs = Vec::new();
            spec.encode_when.referenced_tiers(&mut refs);
            spec.verify_when.referenced_tiers(&mut refs);
            if let Some(missing) = refs.iter().find(|name| !seen.contains(*name)) {
                return Err(invalid(format!(
                    "{} refers to {} before it is declared",
                    spec.name, missing
                )));
            }
            if !seen.insert(&spec.name) {
                return Err(invalid(format!("duplicate tier {}", spec.name)));
            }
        }

        for spec in &specs {
            match &spec.base {
                Some(base) if !seen.contains(base) => {
                    return Err(invalid(format!("{} has unknown base {}", spec.name, base)));
                }
                None if spec.verify_when != Condition::Never => {
                    return Err(invalid(format!(
                        "{} is verified but has no base tier",
                        spec.name
                    )));
                }
                _ => {}
            }
        }

        let topology = Self { specs };
        for spec in &topology.specs {
            // A chain longer than the table means a cycle
            let mut steps = 0;
            let mut current = spec;
            while let Some(base) = &current.base {
                steps += 1;
                if steps > topology.specs.len() {
                    return Err(invalid(format!("base chain of {} is cyclic", spec.name)));
                }
                current = topology
                    .get(base)
                    .ok_or_else(|| invalid(format!("unknown base {}", base)))?;
            }
        }

        Ok(topology)
    }

    /// Default table plus the optional 44.1 kHz / 16-bit CD tier
    pub fn with_cd_tier() -> Self {
        let mut topology = Self::default();
        topology.specs.push(TierSpec {
            name: TierName::cd(),
            encode_when: Condition::Always,
            verify_when: Condition::Never,
            sample_rate: Resolution::Fixed(44100),
            bit_depth: Resolution::Fixed(16),
            base: None,
        });
        topology
    }

    pub fn specs(&self) -> &[TierSpec] {
        &self.specs
    }

    pub fn get(&self, name: &TierName) -> Option<&TierSpec> {
        self.specs.iter().find(|s| &s.name == name)
    }

    /// Base chain of a tier, root first and ending with the tier itself
    pub fn chain(&self, name: &TierName) -> Vec<TierName> {
        let mut chain = Vec::new();
        let mut current = self.get(name);
        while let Some(spec) = current {
            chain.push(spec.name.clone());
            current = spec.base.as_ref().and_then(|base| self.get(base));
        }
        chain.reverse();
        chain
    }
}
