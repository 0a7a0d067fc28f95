//! Builder used to assemble a [`LinkConfig`] with validation.

use super::field::{Comparator, FieldDescriptor};
use super::link::LinkConfig;
use super::precision::safe_plan;
use super::{ConfigError, MAX_EXCHANGE_GROUP_SIZE, SUPPORTED_MACHINE_BIT_WIDTHS};

/// Builder for [`LinkConfig`].
///
/// Fields are public so test code and configuration frontends can assemble
/// the builder directly; [`LinkConfigBuilder::build`] runs every invariant
/// check and derives the default precision plan.
///
/// | Field | Default |
/// |-------|---------|
/// | `fields` | empty (must be filled) |
/// | `exchange_groups` | empty |
/// | `match_threshold` / `tentative_threshold` | `0.9` / `0.7` |
/// | `matching_mode` | `false` |
/// | `machine_bit_width` | `32` |
#[derive(Debug, Clone)]
pub struct LinkConfigBuilder {
    /// Field descriptors in canonical (insertion) order.
    pub fields: Vec<FieldDescriptor>,
    /// Exchange groups as lists of field names.
    pub exchange_groups: Vec<Vec<String>>,
    /// Score above which a row is a match.
    pub match_threshold: f64,
    /// Score above which a row is a tentative match.
    pub tentative_threshold: f64,
    /// Carried matching-mode flag; see [`LinkConfig::matching_mode`].
    pub matching_mode: bool,
    /// Arithmetic width of the secure backend.
    pub machine_bit_width: usize,
}

impl LinkConfigBuilder {
    /// Returns a builder initialised with the documented defaults.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            exchange_groups: Vec::new(),
            match_threshold: 0.9,
            tentative_threshold: 0.7,
            matching_mode: false,
            machine_bit_width: 32,
        }
    }

    /// Appends a field descriptor, preserving insertion order.
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    /// Declares an exchange group over the named fields.
    pub fn exchange_group<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exchange_groups
            .push(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets both thresholds.
    pub fn thresholds(mut self, match_threshold: f64, tentative_threshold: f64) -> Self {
        self.match_threshold = match_threshold;
        self.tentative_threshold = tentative_threshold;
        self
    }

    /// Sets the backend arithmetic width.
    pub fn machine_bit_width(mut self, bits: usize) -> Self {
        self.machine_bit_width = bits;
        self
    }

    /// Sets the matching-mode flag.
    pub fn matching_mode(mut self, enabled: bool) -> Self {
        self.matching_mode = enabled;
        self
    }

    /// Validates every invariant and emits a [`LinkConfig`].
    pub fn build(&self) -> Result<LinkConfig, ConfigError> {
        if !SUPPORTED_MACHINE_BIT_WIDTHS.contains(&self.machine_bit_width) {
            return Err(ConfigError::UnsupportedMachineWidth {
                got: self.machine_bit_width,
            });
        }
        if self.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }
        for (pos, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
            if !(field.weight.is_finite() && field.weight > 0.0) {
                return Err(ConfigError::InvalidWeight {
                    name: field.name.clone(),
                    weight: field.weight,
                });
            }
            if field.bit_width == 0 {
                return Err(ConfigError::ZeroBitWidth {
                    name: field.name.clone(),
                });
            }
            if self.fields[..pos].iter().any(|f| f.name == field.name) {
                return Err(ConfigError::DuplicateField {
                    name: field.name.clone(),
                });
            }
        }

        validate_threshold("match", self.match_threshold)?;
        validate_threshold("tentative", self.tentative_threshold)?;
        if self.tentative_threshold > self.match_threshold {
            return Err(ConfigError::ThresholdOrder {
                match_threshold: self.match_threshold,
                tentative_threshold: self.tentative_threshold,
            });
        }

        let groups = self.resolve_groups()?;

        let max_set_width = self
            .fields
            .iter()
            .filter(|f| f.comparator == Comparator::SetSimilarity)
            .map(|f| f.bit_width as usize)
            .max()
            .unwrap_or(0);
        let plan = safe_plan(self.machine_bit_width, self.fields.len(), max_set_width)?;
        let max_weight = self
            .fields
            .iter()
            .map(|f| f.weight)
            .fold(f64::MIN, f64::max);

        Ok(LinkConfig::from_parts(
            self.fields.clone(),
            groups,
            self.match_threshold,
            self.tentative_threshold,
            self.matching_mode,
            self.machine_bit_width,
            plan,
            max_weight,
            max_set_width,
        ))
    }

    /// Resolves group member names to insertion indices and checks the group
    /// invariants: known members, pairwise disjoint groups, uniform
    /// comparator and bit width, and the permutation cost ceiling.
    fn resolve_groups(&self) -> Result<Vec<Vec<usize>>, ConfigError> {
        let mut seen = vec![false; self.fields.len()];
        let mut resolved = Vec::with_capacity(self.exchange_groups.len());
        for group in &self.exchange_groups {
            if group.len() < 2 {
                return Err(ConfigError::GroupTooSmall { size: group.len() });
            }
            if group.len() > MAX_EXCHANGE_GROUP_SIZE {
                return Err(ConfigError::GroupTooLarge {
                    size: group.len(),
                    max: MAX_EXCHANGE_GROUP_SIZE,
                });
            }
            let mut indices = Vec::with_capacity(group.len());
            for name in group {
                let index = self
                    .fields
                    .iter()
                    .position(|f| &f.name == name)
                    .ok_or_else(|| ConfigError::UnknownGroupField { name: name.clone() })?;
                if seen[index] {
                    return Err(ConfigError::OverlappingGroups { name: name.clone() });
                }
                seen[index] = true;
                indices.push(index);
            }
            // Canonical member order is insertion order; permutations are
            // enumerated lexicographically over this list.
            indices.sort_unstable();

            let first = &self.fields[indices[0]];
            for &index in &indices[1..] {
                let member = &self.fields[index];
                if member.comparator != first.comparator {
                    return Err(ConfigError::MixedComparators {
                        left: first.name.clone(),
                        right: member.name.clone(),
                    });
                }
                if member.bit_width != first.bit_width {
                    return Err(ConfigError::MixedBitWidths {
                        left: first.name.clone(),
                        right: member.name.clone(),
                    });
                }
            }
            resolved.push(indices);
        }
        Ok(resolved)
    }
}

impl Default for LinkConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_threshold(which: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
        return Err(ConfigError::ThresholdOutOfRange { which, value });
    }
    Ok(())
}
