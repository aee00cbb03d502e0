// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that define the core concepts:
// token sequences, masked examples, run configuration, the
// error taxonomy and the collaborator abstractions.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Validated launch parameters: masking, schedule, run identity
pub mod config;

// InvalidConfig / BatchProcessing / TrackingDelivery
pub mod error;

// Assembly procedures, keysteps and their labels
pub mod procedure;

// Token sequences and masked examples
pub mod sequence;

// Core abstractions (traits) that other layers implement
pub mod traits;
