use std::fmt;

use serde::{Deserialize, Serialize};

/// `(tenant, project, env, service)` — the only stable user-facing
/// identifier. Every derived name (container, ports, db name/user, image
/// tag) is a pure function of this tuple, computed in `naming`.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Tuple {
  pub tenant: String,
  pub project: String,
  pub env: String,
  pub service: String,
}

impl Tuple {
  pub fn new(
    tenant: impl Into<String>,
    project: impl Into<String>,
    env: impl Into<String>,
    service: impl Into<String>,
  ) -> Self {
    Self {
      tenant: tenant.into(),
      project: project.into(),
      env: env.into(),
      service: service.into(),
    }
  }

  /// `[a-z0-9_]+` on every component. Checked at config-load time; a
  /// failure here is a `ConfigError`, never a runtime surprise deep in a
  /// rollout.
  pub fn validate(&self) -> Result<(), String> {
    for (field, value) in [
      ("tenant", &self.tenant),
      ("project", &self.project),
      ("env", &self.env),
      ("service", &self.service),
    ] {
      if value.is_empty()
        || !value
          .bytes()
          .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
      {
        return Err(format!(
          "tuple field `{field}` = {value:?} must match [a-z0-9_]+"
        ));
      }
    }
    Ok(())
  }

  /// The `(tenant, project, env)` scope a Health Monitor peer set and a
  /// zone-wide sidecar update both operate within.
  pub fn scope(&self) -> (&str, &str, &str) {
    (&self.tenant, &self.project, &self.env)
  }
}

impl fmt::Display for Tuple {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}_{}_{}_{}",
      self.tenant, self.project, self.env, self.service
    )
  }
}

/// Which of the toggle slots (base / `_secondary`) a container occupies.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
  Base,
  Secondary,
}

impl Toggle {
  pub fn other(self) -> Toggle {
    match self {
      Toggle::Base => Toggle::Secondary,
      Toggle::Secondary => Toggle::Base,
    }
  }
}

impl fmt::Display for Toggle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Toggle::Base => write!(f, "base"),
      Toggle::Secondary => write!(f, "secondary"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validates_lowercase_alnum_underscore() {
    let t = Tuple::new("u1", "myapp", "prod", "postgres");
    assert!(t.validate().is_ok());
  }

  #[test]
  fn rejects_uppercase_and_punctuation() {
    assert!(Tuple::new("U1", "myapp", "prod", "postgres").validate().is_err());
    assert!(Tuple::new("u1", "my-app", "prod", "postgres").validate().is_err());
    assert!(Tuple::new("u1", "myapp", "", "postgres").validate().is_err());
  }

  #[test]
  fn display_matches_container_name_shape() {
    let t = Tuple::new("u1", "myapp", "prod", "postgres");
    assert_eq!(t.to_string(), "u1_myapp_prod_postgres");
  }

  #[test]
  fn toggle_other_is_involution() {
    assert_eq!(Toggle::Base.other(), Toggle::Secondary);
    assert_eq!(Toggle::Secondary.other(), Toggle::Base);
  }
}
