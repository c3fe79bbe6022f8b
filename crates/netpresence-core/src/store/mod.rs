// ── Device storage ──
//
// `Registry` is the single shared mutable structure; every scan merges
// through it. `persist` moves it to and from disk.

mod persist;
mod registry;

pub use persist::{JsonFileStore, MemoryStore, RegistrySnapshot, RegistryStore, SCHEMA_VERSION};
pub use registry::Registry;
