//! The immutable link configuration and its canonical digest.

use serde::{Deserialize, Serialize};

use super::field::{Comparator, FieldDescriptor};
use super::precision::{check_budget, ideal_plan, PrecisionPlan};
use super::ConfigError;
use crate::num::hw_bits;

/// Domain separator prepended to the canonical byte layout before hashing it
/// into the configuration digest.
pub const CONFIG_DIGEST_DOMAIN_TAG: &[u8; 14] = b"SEALINK-CFG-V1";

/// Canonical, validated linkage configuration.
///
/// Shared read-only by the clear evaluator and the circuit builder. Only the
/// precision setters mutate it, and they re-validate the overflow budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    fields: Vec<FieldDescriptor>,
    exchange_groups: Vec<Vec<usize>>,
    match_threshold: f64,
    tentative_threshold: f64,
    matching_mode: bool,
    machine_bit_width: usize,
    set_sim_prec: usize,
    weight_prec: usize,
    max_weight: f64,
    max_set_width: usize,
    hw_bits: usize,
}

impl LinkConfig {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn from_parts(
        fields: Vec<FieldDescriptor>,
        exchange_groups: Vec<Vec<usize>>,
        match_threshold: f64,
        tentative_threshold: f64,
        matching_mode: bool,
        machine_bit_width: usize,
        plan: PrecisionPlan,
        max_weight: f64,
        max_set_width: usize,
    ) -> Self {
        Self {
            fields,
            exchange_groups,
            match_threshold,
            tentative_threshold,
            matching_mode,
            machine_bit_width,
            set_sim_prec: plan.set_sim_prec,
            weight_prec: plan.weight_prec,
            max_weight,
            max_set_width,
            hw_bits: hw_bits(max_set_width),
        }
    }

    /// Field descriptors in canonical order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of configured fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Resolves a field name to its canonical index.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Exchange groups as sorted lists of canonical field indices.
    pub fn exchange_groups(&self) -> &[Vec<usize>] {
        &self.exchange_groups
    }

    /// Canonical indices of fields not claimed by any exchange group.
    pub fn ungrouped_fields(&self) -> Vec<usize> {
        let mut grouped = vec![false; self.fields.len()];
        for group in &self.exchange_groups {
            for &index in group {
                grouped[index] = true;
            }
        }
        (0..self.fields.len()).filter(|&i| !grouped[i]).collect()
    }

    /// Score above which a row is a match.
    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    /// Score above which a row is a tentative match.
    pub fn tentative_threshold(&self) -> f64 {
        self.tentative_threshold
    }

    /// Carried matching-mode flag.
    ///
    /// The flag selects threshold semantics in downstream record-linkage
    /// deployments. The core carries and reports it but applies no special
    /// tentative-threshold rule when it is set; callers choose between the
    /// linkage and the counting operation explicitly.
    pub fn matching_mode(&self) -> bool {
        self.matching_mode
    }

    /// Arithmetic width of the secure backend.
    pub fn machine_bit_width(&self) -> usize {
        self.machine_bit_width
    }

    /// Fractional bits of the set-similarity coefficient.
    pub fn set_sim_prec(&self) -> usize {
        self.set_sim_prec
    }

    /// Fractional bits of rescaled weights.
    pub fn weight_prec(&self) -> usize {
        self.weight_prec
    }

    /// Largest configured weight; rescaling maps it to the all-ones value.
    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    /// Widest set-similarity payload, in bits.
    pub fn max_set_width(&self) -> usize {
        self.max_set_width
    }

    /// Width of population-count shares.
    pub fn hw_bits(&self) -> usize {
        self.hw_bits
    }

    /// Current precision plan.
    pub fn precision_plan(&self) -> PrecisionPlan {
        PrecisionPlan {
            set_sim_prec: self.set_sim_prec,
            weight_prec: self.weight_prec,
        }
    }

    /// Overrides the precision plan after re-checking the overflow budget.
    pub fn set_precisions(
        &mut self,
        set_sim_prec: usize,
        weight_prec: usize,
    ) -> Result<(), ConfigError> {
        check_budget(
            set_sim_prec,
            weight_prec,
            self.fields.len(),
            self.machine_bit_width,
        )?;
        self.set_sim_prec = set_sim_prec;
        self.weight_prec = weight_prec;
        Ok(())
    }

    /// Switches to the ideal precision plan (bits split in thirds).
    ///
    /// The resulting similarity precision can exceed what the 16-bit division
    /// sub-circuit accepts; the circuit builder rejects such a plan at build
    /// time. The clear evaluator has no such restriction.
    pub fn set_ideal_precisions(&mut self) -> Result<(), ConfigError> {
        let plan = ideal_plan(self.machine_bit_width, self.fields.len());
        self.set_precisions(plan.set_sim_prec, plan.weight_prec)
    }

    /// Computes the canonical configuration digest.
    ///
    /// Both parties must run the linkage over identical configurations; the
    /// digest gives them a compact value to compare out-of-band before
    /// starting a run.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CONFIG_DIGEST_DOMAIN_TAG);
        hasher.update(&(self.fields.len() as u16).to_le_bytes());
        for field in &self.fields {
            hasher.update(&(field.name.len() as u16).to_le_bytes());
            hasher.update(field.name.as_bytes());
            hasher.update(&field.weight.to_bits().to_le_bytes());
            hasher.update(&[match field.comparator {
                Comparator::SetSimilarity => 0u8,
                Comparator::Equality => 1u8,
            }]);
            hasher.update(&field.bit_width.to_le_bytes());
            hasher.update(&[type_hint_code(field)]);
        }
        hasher.update(&(self.exchange_groups.len() as u16).to_le_bytes());
        for group in &self.exchange_groups {
            hasher.update(&(group.len() as u16).to_le_bytes());
            for &index in group {
                hasher.update(&(index as u16).to_le_bytes());
            }
        }
        hasher.update(&self.match_threshold.to_bits().to_le_bytes());
        hasher.update(&self.tentative_threshold.to_bits().to_le_bytes());
        hasher.update(&[self.matching_mode as u8]);
        hasher.update(&(self.machine_bit_width as u16).to_le_bytes());
        hasher.update(&(self.set_sim_prec as u16).to_le_bytes());
        hasher.update(&(self.weight_prec as u16).to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

fn type_hint_code(field: &FieldDescriptor) -> u8 {
    use super::field::TypeHint;
    match field.type_hint {
        None => 0,
        Some(TypeHint::Integer) => 1,
        Some(TypeHint::String) => 2,
        Some(TypeHint::Bitmask) => 3,
        Some(TypeHint::Date) => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Comparator, ConfigError, FieldDescriptor, LinkConfigBuilder};

    fn two_field_builder() -> LinkConfigBuilder {
        LinkConfigBuilder::new()
            .field(FieldDescriptor::new(
                "bm_1",
                2.0,
                Comparator::SetSimilarity,
                8,
            ))
            .field(FieldDescriptor::new(
                "bm_2",
                4.0,
                Comparator::SetSimilarity,
                8,
            ))
    }

    #[test]
    fn ungrouped_fields_excludes_group_members() {
        let cfg = two_field_builder()
            .field(FieldDescriptor::new("int_1", 1.0, Comparator::Equality, 32))
            .exchange_group(["bm_1", "bm_2"])
            .build()
            .unwrap();
        assert_eq!(cfg.ungrouped_fields(), vec![2]);
        assert_eq!(cfg.exchange_groups(), &[vec![0, 1]]);
    }

    #[test]
    fn digest_changes_with_precisions() {
        let cfg = two_field_builder().build().unwrap();
        let mut tweaked = cfg.clone();
        tweaked.set_precisions(8, 8).unwrap();
        assert_ne!(cfg.digest(), tweaked.digest());
        assert_eq!(cfg.digest(), cfg.clone().digest());
    }

    #[test]
    fn explicit_precisions_rechecked() {
        let mut cfg = two_field_builder().build().unwrap();
        let err = cfg.set_precisions(20, 20).unwrap_err();
        assert!(matches!(err, ConfigError::PrecisionOverflow { .. }));
        // The failed call must not have clobbered the plan.
        assert_eq!(cfg.precision_plan(), two_field_builder().build().unwrap().precision_plan());
    }
}
