// ── Patitas Atoms Layer ────────────────────────────────────────────────────
// Pure data: domain records, enumerations, constants and error types.
// Dependency rule: atoms may only depend on std and external pure crates.
// Nothing here may import from engine/ or main.rs.

pub mod constants;
pub mod error;
pub mod types;
