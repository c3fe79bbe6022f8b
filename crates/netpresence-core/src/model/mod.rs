// ── Domain model ──

pub mod device;
pub mod mac;

pub use device::{DeviceRecord, DeviceUpdate, NameCandidate, NameSource, mute_deadline};
pub use mac::{DEVICE_ID_PREFIX, DeviceId, MacAddress, normalize_mac};
