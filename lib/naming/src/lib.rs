//! Component A — Naming & Port Resolver.
//!
//! Pure, side-effect-free derivation of container names, host ports, the
//! stable internal (sidecar) port, database identifiers, and image tags
//! from a [`Tuple`]. Every function here is total: inputs are validated at
//! config-load time (`Tuple::validate`, `ProjectConfig::validate`), so
//! nothing in this crate returns an error.

use drydock_client::entities::tuple::{Toggle, Tuple};

pub const HOST_PORT_BASE_RANGE_START: u16 = 8000;
pub const HOST_PORT_ALT_RANGE_START: u16 = 18000;
pub const INTERNAL_PORT_RANGE_START: u16 = 5000;
const RANGE_SPAN: u32 = 1000;

/// `container_name(T) = "{tenant}_{project}_{env}_{service}"`.
pub fn container_name(t: &Tuple) -> String {
  t.to_string()
}

/// `container_name_alt(T) = container_name(T) + "_secondary"`.
pub fn container_name_alt(t: &Tuple) -> String {
  format!("{}_secondary", container_name(t))
}

/// The name for the given toggle slot.
pub fn container_name_for(t: &Tuple, toggle: Toggle) -> String {
  match toggle {
    Toggle::Base => container_name(t),
    Toggle::Secondary => container_name_alt(t),
  }
}

/// `host_port_base(T, p) = 8000 + H("{tenant}_{project}_{env}_{service}_{p}") mod 1000`.
pub fn host_port_base(t: &Tuple, container_port: u16) -> u16 {
  let seed = format!("{container_name}_{container_port}", container_name = container_name(t));
  HOST_PORT_BASE_RANGE_START + (stable_hash(&seed) % RANGE_SPAN) as u16
}

/// `host_port_alt(T, p) = host_port_base(T, p) + 10000`.
pub fn host_port_alt(t: &Tuple, container_port: u16) -> u16 {
  host_port_base(t, container_port) + (HOST_PORT_ALT_RANGE_START - HOST_PORT_BASE_RANGE_START)
}

/// The host port for the given toggle slot.
pub fn host_port_for(t: &Tuple, container_port: u16, toggle: Toggle) -> u16 {
  match toggle {
    Toggle::Base => host_port_base(t, container_port),
    Toggle::Secondary => host_port_alt(t, container_port),
  }
}

/// `internal_port(T) = 5000 + H("{tenant}_{project}_{env}_{service}_internal") mod 1000`.
///
/// The sidecar listen port; never bound by an app container on the host.
pub fn internal_port(t: &Tuple) -> u16 {
  let seed = format!("{}_internal", container_name(t));
  INTERNAL_PORT_RANGE_START + (stable_hash(&seed) % RANGE_SPAN) as u16
}

/// `db_name(T) = "{project}_" + hex8(H(T))`.
pub fn db_name(t: &Tuple) -> String {
  format!("{}_{:08x}", t.project, stable_hash(&t.to_string()))
}

/// `db_user(T) = "{project}_user"`.
pub fn db_user(t: &Tuple) -> String {
  format!("{}_user", t.project)
}

/// `image_tag(T, version) = "{docker_hub_user}/{tenant}_{project}_{env}_{service}:{version}"`.
pub fn image_tag(t: &Tuple, docker_hub_user: &str, version: &str) -> String {
  format!("{docker_hub_user}/{}:{version}", container_name(t))
}

/// A stable 32-bit hash (`H(s)` in `spec.md` §3), deterministic across Rust
/// versions and process restarts — unlike [`std::collections::hash_map::DefaultHasher`],
/// which makes no such guarantee. FNV-1a.
pub fn stable_hash(s: &str) -> u32 {
  const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
  const FNV_PRIME: u32 = 0x0100_0193;
  s.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ byte as u32).wrapping_mul(FNV_PRIME))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tuple() -> Tuple {
    Tuple::new("acme", "webshop", "prod", "api")
  }

  #[test]
  fn names_are_deterministic_and_distinct() {
    let t = tuple();
    assert_eq!(container_name(&t), "acme_webshop_prod_api");
    assert_eq!(container_name_alt(&t), "acme_webshop_prod_api_secondary");
    assert_ne!(container_name(&t), container_name_alt(&t));
  }

  #[test]
  fn host_ports_stay_within_their_disjoint_ranges() {
    let t = tuple();
    for port in 0..2000u16 {
      let base = host_port_base(&t, port);
      let alt = host_port_alt(&t, port);
      assert!((8000..9000).contains(&base));
      assert!((18000..19000).contains(&alt));
      assert_eq!(alt, base + 10000);
    }
  }

  #[test]
  fn internal_port_never_overlaps_app_port_ranges() {
    let t = tuple();
    let internal = internal_port(&t);
    assert!((5000..6000).contains(&internal));
  }

  #[test]
  fn same_tuple_same_port_is_stable_across_calls() {
    let t = tuple();
    assert_eq!(host_port_base(&t, 8080), host_port_base(&t, 8080));
    assert_eq!(internal_port(&t), internal_port(&t));
  }

  #[test]
  fn db_name_is_namespaced_by_project_and_stable() {
    let t = tuple();
    let name = db_name(&t);
    assert!(name.starts_with("webshop_"));
    assert_eq!(name.len(), "webshop_".len() + 8);
    assert_eq!(db_name(&t), name);
  }

  #[test]
  fn image_tag_embeds_all_components() {
    let t = tuple();
    let tag = image_tag(&t, "acmehub", "42");
    assert_eq!(tag, "acmehub/acme_webshop_prod_api:42");
  }

  #[test]
  fn container_name_for_toggle_matches_base_and_alt() {
    let t = tuple();
    assert_eq!(container_name_for(&t, Toggle::Base), container_name(&t));
    assert_eq!(container_name_for(&t, Toggle::Secondary), container_name_alt(&t));
  }
}
