//! Tier planner: turns source properties into an encode/verify plan

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FomaError, Result};
use crate::tier::{SourceProperties, TierName, Topology};

/// A tier selected for encoding, resolved to concrete numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedTier {
    pub name: TierName,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub base: Option<TierName>,
}

/// Output of [`TierPlanner::plan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPlan {
    pub source: SourceProperties,
    /// Tiers to encode, in table order
    pub encoded: Vec<PlannedTier>,
    /// Tiers to residual-code and verify, nearest-to-root first
    pub verified: Vec<TierName>,
    /// Base chains (root first) of every verified tier
    chains: Vec<(TierName, Vec<TierName>)>,
    /// Resolved rate and depth of every tier in the table, encoded or not
    resolved: Vec<PlannedTier>,
}

impl TierPlan {
    pub fn is_encoded(&self, name: &TierName) -> bool {
        self.encoded.iter().any(|t| &t.name == name)
    }

    pub fn is_verified(&self, name: &TierName) -> bool {
        self.verified.contains(name)
    }

    /// Whether the standard tier is residual-coded and verified
    pub fn process_sr(&self) -> bool {
        self.is_verified(&TierName::sr())
    }

    /// Whether the high-resolution tier is residual-coded and verified
    pub fn process_hr(&self) -> bool {
        self.is_verified(&TierName::hr())
    }

    /// Resolved rate/depth/base of any tier in the table
    pub fn tier(&self, name: &TierName) -> Option<&PlannedTier> {
        self.resolved.iter().find(|t| &t.name == name)
    }

    /// Root tier a verified tier is reconstructed from
    pub fn root_of(&self, name: &TierName) -> Option<&TierName> {
        self.chain(name).and_then(|chain| chain.first())
    }

    /// Residuals to add to the root, in order, to rebuild `name`
    ///
    /// For HR this is `[SR, HR]`. Planning guarantees every entry is verified.
    pub fn residual_cascade(&self, name: &TierName) -> Vec<TierName> {
        self.chain(name)
            .map(|chain| chain.iter().skip(1).cloned().collect())
            .unwrap_or_default()
    }

    fn chain(&self, name: &TierName) -> Option<&Vec<TierName>> {
        self.chains
            .iter()
            .find(|(tier, _)| tier == name)
            .map(|(_, chain)| chain)
    }
}

/// Evaluates a [`Topology`] against source properties
#[derive(Debug, Clone, Default)]
pub struct TierPlanner {
    topology: Topology,
}

impl TierPlanner {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Decide which tiers to encode and which to verify
    ///
    /// Encode conditions are evaluated in table order so `tier_encoded` sees
    /// every earlier decision. Verify conditions depend on the source only:
    /// a tier can be scheduled for verification without being encoded, in
    /// which case its check fails closed later.
    ///
    /// # Errors
    /// `InvalidTopology` if a verified tier resolves to a lower
    /// `sample_rate * bit_depth` than its base, or if a tier between a
    /// verified tier and its root is not verified itself.
    pub fn plan(&self, source: &SourceProperties) -> Result<TierPlan> {
        let mut encoded_names = HashSet::new();
        let mut encoded = Vec::new();
        let mut resolved = Vec::new();

        for spec in self.topology.specs() {
            let tier = PlannedTier {
                name: spec.name.clone(),
                sample_rate: spec.sample_rate.resolve(source.sample_rate),
                bit_depth: spec.bit_depth.resolve(source.bit_depth),
                base: spec.base.clone(),
            };
            if spec.encode_when.evaluate(source, &encoded_names) {
                encoded_names.insert(spec.name.clone());
                encoded.push(tier.clone());
            }
            resolved.push(tier);
        }

        let mut verified: Vec<(usize, usize, TierName)> = Vec::new();
        let mut chains = Vec::new();
        for (position, spec) in self.topology.specs().iter().enumerate() {
            if !spec.verify_when.evaluate(source, &encoded_names) {
                continue;
            }
            let chain = self.topology.chain(&spec.name);
            check_monotonic(&resolved, &spec.name)?;
            if !encoded_names.contains(&spec.name) {
                warn!(
                    "Tier {} is scheduled for verification but will not be encoded; its check will fail",
                    spec.name
                );
            }
            verified.push((chain.len(), position, spec.name.clone()));
            chains.push((spec.name.clone(), chain));
        }
        verified.sort();

        // A residual is taken against its direct base, so every tier between
        // a verified tier and its root has to be rebuilt too
        for (name, chain) in &chains {
            let inner = chain.get(1..chain.len().saturating_sub(1)).unwrap_or(&[]);
            if let Some(gap) = inner.iter().find(|t| !chains.iter().any(|(v, _)| v == *t)) {
                return Err(FomaError::InvalidTopology {
                    reason: format!(
                        "{} is verified but its intermediate base {} is not",
                        name, gap
                    ),
                });
            }
        }

        let plan = TierPlan {
            source: *source,
            encoded,
            verified: verified.into_iter().map(|(_, _, name)| name).collect(),
            chains,
            resolved,
        };

        info!(
            "Planned tiers for {} Hz / {}-bit: encode [{}], verify [{}]",
            source.sample_rate,
            source.bit_depth,
            join(plan.encoded.iter().map(|t| &t.name)),
            join(plan.verified.iter())
        );

        Ok(plan)
    }
}

fn check_monotonic(resolved: &[PlannedTier], name: &TierName) -> Result<()> {
    let find = |n: &TierName| resolved.iter().find(|t| &t.name == n);
    let Some(tier) = find(name) else {
        return Ok(());
    };
    let Some(base) = tier.base.as_ref().and_then(find) else {
        return Ok(());
    };

    let weight = |t: &PlannedTier| t.sample_rate as u64 * t.bit_depth as u64;
    if weight(tier) < weight(base) {
        return Err(FomaError::InvalidTopology {
            reason: format!(
                "{} ({} Hz / {}-bit) is below its base {} ({} Hz / {}-bit)",
                tier.name, tier.sample_rate, tier.bit_depth, base.name, base.sample_rate, base.bit_depth
            ),
        });
    }
    Ok(())
}

fn join<'a>(names: impl Iterator<Item = &'a TierName>) -> String {
    names.map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{Condition, Resolution, TierSpec};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn plan(rate: u32, depth: u16) -> TierPlan {
        TierPlanner::default()
            .plan(&SourceProperties::new(rate, depth))
            .unwrap()
    }

    fn encoded(plan: &TierPlan) -> Vec<&str> {
        plan.encoded.iter().map(|t| t.name.as_str()).collect()
    }

    #[test_case(44100, 16, false, false, &["CR"] ; "cd master")]
    #[test_case(44100, 24, true, false, &["SR", "CR"] ; "44k1 at 24 bit qualifies for SR")]
    #[test_case(48000, 16, false, false, &["SR", "CR"] ; "48k at 16 bit encodes SR without verifying")]
    #[test_case(48000, 24, true, false, &["SR", "CR"] ; "48k at 24 bit")]
    #[test_case(96000, 24, true, true, &["HR", "SR", "CR"] ; "96k at 24 bit")]
    #[test_case(192000, 16, true, false, &["HR", "SR", "CR"] ; "high rate low depth")]
    #[test_case(44100, 32, true, false, &["HR", "SR", "CR"] ; "float master at 44k1")]
    #[test_case(32000, 24, true, false, &["CR"] ; "SR verified but never encoded")]
    fn test_gating(rate: u32, depth: u16, sr: bool, hr: bool, tiers: &[&str]) {
        let plan = plan(rate, depth);
        assert_eq!(plan.process_sr(), sr);
        assert_eq!(plan.process_hr(), hr);
        assert_eq!(encoded(&plan), tiers);
    }

    #[test]
    fn test_sr_precedence_binds_and_tighter() {
        // 44.1 kHz needs 24-bit, 48 kHz does not
        assert!(!plan(44100, 16).is_encoded(&TierName::sr()));
        assert!(plan(48000, 16).is_encoded(&TierName::sr()));
    }

    #[test]
    fn test_hr_resolves_to_native() {
        let plan = plan(192000, 24);
        let hr = plan.tier(&TierName::hr()).unwrap();
        assert_eq!((hr.sample_rate, hr.bit_depth), (192000, 24));
        let cr = plan.tier(&TierName::cr()).unwrap();
        assert_eq!((cr.sample_rate, cr.bit_depth), (48000, 16));
    }

    #[test]
    fn test_hr_cascade_goes_through_sr() {
        let plan = plan(96000, 24);
        assert_eq!(plan.verified, vec![TierName::sr(), TierName::hr()]);
        assert_eq!(plan.root_of(&TierName::hr()), Some(&TierName::cr()));
        assert_eq!(
            plan.residual_cascade(&TierName::hr()),
            vec![TierName::sr(), TierName::hr()]
        );
        assert_eq!(plan.residual_cascade(&TierName::sr()), vec![TierName::sr()]);
    }

    #[test]
    fn test_cd_tier_is_optional() {
        let planner = TierPlanner::new(Topology::with_cd_tier());
        let plan = planner.plan(&SourceProperties::new(96000, 24)).unwrap();
        assert!(plan.is_encoded(&TierName::cd()));
        assert!(!plan.is_verified(&TierName::cd()));
        assert!(!self::plan(96000, 24).is_encoded(&TierName::cd()));
    }

    #[test]
    fn test_verified_tier_below_base_is_rejected() {
        let topology = Topology::new(vec![
            TierSpec {
                name: TierName::new("LO"),
                encode_when: Condition::Always,
                verify_when: Condition::Always,
                sample_rate: Resolution::Fixed(22050),
                bit_depth: Resolution::Fixed(16),
                base: Some(TierName::cr()),
            },
            TierSpec {
                name: TierName::cr(),
                encode_when: Condition::Always,
                verify_when: Condition::Never,
                sample_rate: Resolution::Fixed(48000),
                bit_depth: Resolution::Fixed(16),
                base: None,
            },
        ])
        .unwrap();

        let result = TierPlanner::new(topology).plan(&SourceProperties::new(48000, 24));
        assert!(matches!(result, Err(FomaError::InvalidTopology { .. })));
    }

    #[test]
    fn test_unverified_intermediate_base_is_rejected() {
        let tier = |name: &str, verify_when, rate, base: Option<TierName>| TierSpec {
            name: TierName::new(name),
            encode_when: Condition::Always,
            verify_when,
            sample_rate: Resolution::Fixed(rate),
            bit_depth: Resolution::Fixed(24),
            base,
        };
        let topology = Topology::new(vec![
            tier("HR", Condition::Always, 96000, Some(TierName::sr())),
            tier("SR", Condition::Never, 48000, Some(TierName::cr())),
            tier("CR", Condition::Never, 48000, None),
        ])
        .unwrap();

        let err = TierPlanner::new(topology)
            .plan(&SourceProperties::new(96000, 24))
            .unwrap_err();
        assert!(matches!(err, FomaError::InvalidTopology { .. }));
        assert!(err.to_string().contains("SR"));
    }
}
