use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entities::tuple::Tuple;

/// One upstream target in a sidecar stream/http block: either a container
/// name (single-host mode, resolved via the container-network DNS) or a
/// `private_ip:host_port` pair (multi-host mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Upstream {
  ContainerName { name: String, port: u16 },
  HostPort { private_ip: std::net::IpAddr, port: u16 },
}

impl Upstream {
  pub fn render(&self) -> String {
    match self {
      Upstream::ContainerName { name, port } => format!("{name}:{port}"),
      Upstream::HostPort { private_ip, port } => format!("{private_ip}:{port}"),
    }
  }
}

/// Whether the sidecar addresses a service's backends by container name
/// (single host in the zone) or by private IP + host port (multi-host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SidecarMode {
  SingleHost,
  MultiHost,
}

/// Per `T`, the sidecar's view of where traffic should go, per `spec.md`
/// §3 "Sidecar stream block".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarStreamBlock {
  pub tuple: Tuple,
  pub listen: u16,
  pub upstreams: Vec<Upstream>,
  pub mode: SidecarMode,
  pub connect_timeout: Duration,
  pub idle_timeout: Duration,
  /// `true` for HTTP services: rendered into `http.d/` with a `server_name`
  /// match instead of a bare stream `listen` block.
  pub http: bool,
}

impl SidecarStreamBlock {
  pub fn file_name(&self) -> String {
    format!("{}.conf", self.tuple)
  }

  /// Renders the nginx-style stream config described in `spec.md` §6: one
  /// `upstream` block with `least_conn` and one or more `server` lines,
  /// one `server` block forwarding to it.
  pub fn render(&self) -> String {
    let upstream_name = self.tuple.to_string();
    let mut out = format!("upstream {upstream_name} {{\n  least_conn;\n");
    for upstream in &self.upstreams {
      out.push_str(&format!("  server {};\n", upstream.render()));
    }
    out.push_str("}\n\n");
    out.push_str("server {\n");
    out.push_str(&format!("  listen {};\n", self.listen));
    out.push_str(&format!("  proxy_pass {upstream_name};\n"));
    out.push_str(&format!(
      "  proxy_connect_timeout {}s;\n",
      self.connect_timeout.as_secs()
    ));
    let timeout_directive = if self.http { "proxy_read_timeout" } else { "proxy_timeout" };
    out.push_str(&format!(
      "  {timeout_directive} {}s;\n",
      self.idle_timeout.as_secs()
    ));
    out.push_str("}\n");
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  #[test]
  fn renders_single_host_mode_by_container_name() {
    let block = SidecarStreamBlock {
      tuple: Tuple::new("u1", "myapp", "prod", "postgres"),
      listen: 5234,
      upstreams: vec![Upstream::ContainerName {
        name: "u1_myapp_prod_postgres".into(),
        port: 5432,
      }],
      mode: SidecarMode::SingleHost,
      connect_timeout: Duration::from_secs(1),
      idle_timeout: Duration::from_secs(60),
      http: false,
    };
    let rendered = block.render();
    assert!(rendered.contains("upstream u1_myapp_prod_postgres {"));
    assert!(rendered.contains("server u1_myapp_prod_postgres:5432;"));
    assert!(rendered.contains("listen 5234;"));
    assert!(rendered.contains("least_conn;"));
    assert!(rendered.contains("proxy_timeout 60s;"));
  }

  #[test]
  fn renders_multi_host_mode_by_private_ip_and_host_port() {
    let block = SidecarStreamBlock {
      tuple: Tuple::new("u1", "myapp", "prod", "api"),
      listen: 5357,
      upstreams: vec![
        Upstream::HostPort { private_ip: Ipv4Addr::new(10, 0, 0, 1).into(), port: 8357 },
        Upstream::HostPort { private_ip: Ipv4Addr::new(10, 0, 0, 2).into(), port: 8357 },
      ],
      mode: SidecarMode::MultiHost,
      connect_timeout: Duration::from_secs(1),
      idle_timeout: Duration::from_secs(60),
      http: false,
    };
    let rendered = block.render();
    assert!(rendered.contains("server 10.0.0.1:8357;"));
    assert!(rendered.contains("server 10.0.0.2:8357;"));
  }
}
