//! The secure linkage circuit: gadgets, quotient shares and the builder.

mod builder;
pub mod gadgets;
mod quotient;

pub use builder::{CircuitBuilder, CountHandles, LinkageHandles};
pub use quotient::{sum_field_weights, ArithQuotient, FieldWeight, MaxCandidate};
