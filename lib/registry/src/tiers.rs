//! The tier table: `dev.{small,medium,large,xlarge}` to concrete
//! `{cpuCores, memoryMb, storageMb}`, geometrically scaled per §4.9.

use std::collections::HashMap;
use std::sync::OnceLock;

use pinacle_client::entities::registry::TierSpec;

pub const TIER_SMALL: &str = "dev.small";
pub const TIER_MEDIUM: &str = "dev.medium";
pub const TIER_LARGE: &str = "dev.large";
pub const TIER_XLARGE: &str = "dev.xlarge";

/// Looks up a tier by id. `None` means the declarative config named an
/// unknown tier — callers surface this as `CoreError::ConfigInvalid`.
pub fn tier(id: &str) -> Option<TierSpec> {
  table().get(id).copied()
}

pub fn table() -> &'static HashMap<&'static str, TierSpec> {
  static TABLE: OnceLock<HashMap<&'static str, TierSpec>> = OnceLock::new();
  TABLE.get_or_init(|| {
    HashMap::from([
      (
        TIER_SMALL,
        TierSpec { cpu_cores: 1.0, memory_mb: 1024, storage_mb: 10_240 },
      ),
      (
        TIER_MEDIUM,
        TierSpec { cpu_cores: 2.0, memory_mb: 2048, storage_mb: 20_480 },
      ),
      (
        TIER_LARGE,
        TierSpec { cpu_cores: 4.0, memory_mb: 4096, storage_mb: 40_960 },
      ),
      (
        TIER_XLARGE,
        TierSpec { cpu_cores: 8.0, memory_mb: 8192, storage_mb: 81_920 },
      ),
    ])
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn each_tier_doubles_the_one_below() {
    let small = tier(TIER_SMALL).unwrap();
    let medium = tier(TIER_MEDIUM).unwrap();
    let large = tier(TIER_LARGE).unwrap();
    let xlarge = tier(TIER_XLARGE).unwrap();
    assert_eq!(medium.cpu_cores, small.cpu_cores * 2.0);
    assert_eq!(large.memory_mb, medium.memory_mb * 2);
    assert_eq!(xlarge.storage_mb, large.storage_mb * 2);
  }

  #[test]
  fn unknown_tier_is_none() {
    assert!(tier("dev.huge").is_none());
  }
}
