//! Deterministic subnet allocation, §4.4: a hash of `podId` picks a
//! starting octet in `[100, 254]`, then the allocator scans forward
//! (wrapping within the range) for the first `10.{octet}.1.0/24` not
//! already in use by the engine's own bridge networks.

use std::collections::HashSet;

const OCTET_RANGE_START: u16 = 100;
const OCTET_RANGE_END: u16 = 254;

/// One allocated per-pod subnet: the pod sits at `.2`, the bridge
/// gateway at `.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedSubnet {
  pub octet: u16,
  pub cidr: String,
  pub pod_ip: String,
  pub gateway_ip: String,
}

impl AllocatedSubnet {
  fn for_octet(octet: u16) -> Self {
    Self {
      octet,
      cidr: format!("10.{octet}.1.0/24"),
      pod_ip: format!("10.{octet}.1.2"),
      gateway_ip: format!("10.{octet}.1.1"),
    }
  }
}

/// Hashes `pod_id` to a starting octet in `[100, 254]`. Uses the same
/// FNV-1a shape as the rest of the codebase's deterministic-from-string
/// helpers, not a keyed hasher, since the result must be stable across
/// processes and restarts.
fn starting_octet(pod_id: &str) -> u16 {
  let mut hash: u64 = 0xcbf29ce484222325;
  for byte in pod_id.as_bytes() {
    hash ^= *byte as u64;
    hash = hash.wrapping_mul(0x100000001b3);
  }
  let span = (OCTET_RANGE_END - OCTET_RANGE_START + 1) as u64;
  OCTET_RANGE_START + (hash % span) as u16
}

/// Scans forward from the pod's hashed starting octet for the first
/// subnet not in `existing_subnets` (the set of `10.{n}.1.0/24` CIDRs
/// the engine already reports in use). Fails once every octet in the
/// range has been tried.
pub fn allocate_subnet(
  pod_id: &str,
  existing_subnets: &HashSet<String>,
) -> Result<AllocatedSubnet, String> {
  let start = starting_octet(pod_id);
  let span = OCTET_RANGE_END - OCTET_RANGE_START + 1;
  for offset in 0..span {
    let octet = OCTET_RANGE_START + (start - OCTET_RANGE_START + offset) % span;
    let candidate = AllocatedSubnet::for_octet(octet);
    if !existing_subnets.contains(&candidate.cidr) {
      return Ok(candidate);
    }
  }
  Err(format!(
    "exhausted subnet range 10.{{{OCTET_RANGE_START}-{OCTET_RANGE_END}}}.1.0/24 for pod {pod_id}"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocation_is_deterministic_for_same_pod_id() {
    let empty = HashSet::new();
    let a = allocate_subnet("pod-abc", &empty).unwrap();
    let b = allocate_subnet("pod-abc", &empty).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn pod_and_gateway_ips_follow_fixed_offsets() {
    let empty = HashSet::new();
    let allocated = allocate_subnet("pod-xyz", &empty).unwrap();
    assert!(allocated.pod_ip.ends_with(".1.2"));
    assert!(allocated.gateway_ip.ends_with(".1.1"));
  }

  #[test]
  fn skips_subnets_already_in_use() {
    let start = starting_octet("pod-abc");
    let taken = AllocatedSubnet::for_octet(start);
    let mut existing = HashSet::new();
    existing.insert(taken.cidr.clone());
    let allocated = allocate_subnet("pod-abc", &existing).unwrap();
    assert_ne!(allocated.cidr, taken.cidr);
  }

  #[test]
  fn fails_once_range_is_fully_exhausted() {
    let existing: HashSet<String> = (OCTET_RANGE_START..=OCTET_RANGE_END)
      .map(|o| AllocatedSubnet::for_octet(o).cidr)
      .collect();
    assert!(allocate_subnet("pod-abc", &existing).is_err());
  }
}
