use colored::Colorize;
use serror::Serror;

/// A one-line, colored summary of a rollout step, printed to the console
/// the control plane runs under (`bin/control` is not a daemon-only
/// process; an operator tails it directly).
pub fn step(name: impl std::fmt::Display, ok: bool) -> String {
  if ok {
    format!("{} {name}", "OK".green().bold())
  } else {
    format!("{} {name}", "FAIL".red().bold())
  }
}

pub fn format_serror(Serror { error, trace }: &Serror) -> String {
  let trace = if !trace.is_empty() {
    let mut out = format!("\n\n{}:", "trace".dimmed());
    for (i, msg) in trace.iter().enumerate() {
      out.push_str(&format!("\n\t{}: {msg}", (i + 1).to_string().dimmed()));
    }
    out
  } else {
    Default::default()
  };
  format!("{}: {error}{trace}", "ERROR".red().bold())
}
