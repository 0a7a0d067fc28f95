#![allow(dead_code)]

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tempfile::TempDir;

use sealink::{
    Bitmask, ClientInput, Comparator, EngineConfig, FieldDescriptor, LinkConfig,
    LinkConfigBuilder, Record, ServerInput, INT_DIV_CIRCUIT_FILE,
};

pub const MATCH_THRESHOLD: f64 = 0.9;
pub const TENTATIVE_THRESHOLD: f64 = 0.7;

pub fn bm_field(name: &str, weight: f64, bit_width: u16) -> FieldDescriptor {
    FieldDescriptor::new(name, weight, Comparator::SetSimilarity, bit_width)
}

pub fn eq_field(name: &str, weight: f64, bit_width: u16) -> FieldDescriptor {
    FieldDescriptor::new(name, weight, Comparator::Equality, bit_width)
}

pub fn bitmask(bytes: &[u8]) -> Option<Bitmask> {
    Some(Bitmask::new(bytes.to_vec()))
}

pub fn record(entries: &[(&str, Option<Bitmask>)]) -> Record {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn client_input(entries: &[(&str, Option<Bitmask>)], nvals: u32) -> ClientInput {
    ClientInput::new(record(entries), nvals)
}

pub fn server_input(columns: &[(&str, Vec<Option<Bitmask>>)]) -> ServerInput {
    let database: BTreeMap<String, Vec<Option<Bitmask>>> = columns
        .iter()
        .map(|(name, column)| (name.to_string(), column.clone()))
        .collect();
    ServerInput::new(database).expect("fixture columns are uniform")
}

/// Engine configuration over a temporary circuit-data directory holding the
/// integer-division sub-circuit.
pub struct EngineFixture {
    pub dir: TempDir,
    pub config: EngineConfig,
}

impl EngineFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create circuit data dir");
        std::fs::write(
            dir.path().join(INT_DIV_CIRCUIT_FILE),
            b"int-div 16 16 -> 16\n",
        )
        .expect("write divider stub");
        let config = EngineConfig {
            circuit_data_dir: dir.path().to_path_buf(),
            reveal_score: true,
            ..EngineConfig::default()
        };
        Self { dir, config }
    }

    /// Same directory, but without the divider file.
    pub fn without_divider() -> Self {
        let fixture = Self::new();
        std::fs::remove_file(fixture.dir.path().join(INT_DIV_CIRCUIT_FILE))
            .expect("remove divider stub");
        fixture
    }
}

/// Single equality field, `0xDEADBEEF` on both sides.
pub static EQUALITY_CFG: Lazy<LinkConfig> = Lazy::new(|| {
    LinkConfigBuilder::new()
        .field(eq_field("int_1", 1.0, 32))
        .thresholds(MATCH_THRESHOLD, TENTATIVE_THRESHOLD)
        .build()
        .expect("valid equality fixture")
});

/// Single 8-bit set-similarity field.
pub static SET_SIM_CFG: Lazy<LinkConfig> = Lazy::new(|| {
    LinkConfigBuilder::new()
        .field(bm_field("bm_1", 2.0, 8))
        .thresholds(MATCH_THRESHOLD, TENTATIVE_THRESHOLD)
        .build()
        .expect("valid set-similarity fixture")
});

/// Two equally weighted set-similarity fields in one exchange group.
pub static EXCHANGE_CFG: Lazy<LinkConfig> = Lazy::new(|| {
    LinkConfigBuilder::new()
        .field(bm_field("bm_1", 2.0, 8))
        .field(bm_field("bm_2", 2.0, 8))
        .exchange_group(["bm_1", "bm_2"])
        .thresholds(MATCH_THRESHOLD, TENTATIVE_THRESHOLD)
        .build()
        .expect("valid exchange fixture")
});

/// Two ungrouped set-similarity fields with unequal weights.
pub static TWO_FIELD_CFG: Lazy<LinkConfig> = Lazy::new(|| {
    LinkConfigBuilder::new()
        .field(bm_field("bm_1", 2.0, 8))
        .field(bm_field("bm_2", 4.0, 8))
        .thresholds(MATCH_THRESHOLD, TENTATIVE_THRESHOLD)
        .build()
        .expect("valid two-field fixture")
});
