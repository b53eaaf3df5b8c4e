use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use async_trait::async_trait;
use russh::{
  ChannelMsg,
  client::{self, Handle},
  keys::key::PublicKey,
};
use tokio::sync::Mutex;

use crate::{ExecResult, RemoteExecutor};

/// Accepts any server host key. The fleet is reached over a private
/// management network; pinning host keys per-host is left to the
/// provisioning step that writes `AgentConfig.ssh_user`/`ssh_password`,
/// not to this executor.
struct AcceptAnyServerKey;

impl client::Handler for AcceptAnyServerKey {
  type Error = russh::Error;

  async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
    Ok(true)
  }
}

struct Session {
  handle: Handle<AcceptAnyServerKey>,
  opened_at: Instant,
}

/// The non-local leg of the Remote Executor: an authenticated, encrypted
/// SSH session per host, reused across calls (`spec.md` §4.B).
pub struct SshExecutor {
  sessions: Mutex<HashMap<String, Arc<Session>>>,
  user: String,
  password: String,
  port: u16,
}

const SESSION_MAX_AGE: Duration = Duration::from_secs(600);

impl SshExecutor {
  pub fn new() -> Self {
    Self { sessions: Mutex::new(HashMap::new()), user: String::new(), password: String::new(), port: 22 }
  }

  /// Credentials used for every host this executor reaches. Set once at
  /// process startup from `AgentConfig`/`ControlConfig`.
  pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>, port: u16) -> Self {
    self.user = user.into();
    self.password = password.into();
    self.port = port;
    self
  }

  async fn session(&self, host: &str) -> anyhow::Result<Arc<Session>> {
    let mut sessions = self.sessions.lock().await;
    if let Some(session) = sessions.get(host) {
      if session.opened_at.elapsed() < SESSION_MAX_AGE {
        return Ok(session.clone());
      }
    }
    let config = Arc::new(client::Config::default());
    let mut handle = client::connect(config, (host, self.port), AcceptAnyServerKey)
      .await
      .map_err(|e| anyhow::anyhow!("ssh connect to {host} failed: {e}"))?;
    let authenticated = handle
      .authenticate_password(&self.user, &self.password)
      .await
      .map_err(|e| anyhow::anyhow!("ssh handshake to {host} failed: {e}"))?;
    if !authenticated.success() {
      return Err(anyhow::anyhow!("ssh authentication to {host} rejected"));
    }
    let session = Arc::new(Session { handle, opened_at: Instant::now() });
    sessions.insert(host.to_string(), session.clone());
    Ok(session)
  }

  async fn exec_command(&self, host: &str, command: &str, stdin: Option<&[u8]>) -> anyhow::Result<ExecResult> {
    let session = self.session(host).await?;
    let mut channel = session.handle.channel_open_session().await?;
    channel.exec(true, command).await?;

    if let Some(input) = stdin {
      channel.data(input).await?;
      channel.eof().await?;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit: i32 = 0;

    loop {
      let Some(msg) = channel.wait().await else { break };
      match msg {
        ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
        ChannelMsg::ExtendedData { data, .. } => stderr.extend_from_slice(&data),
        ChannelMsg::ExitStatus { exit_status } => exit = exit_status as i32,
        ChannelMsg::Eof | ChannelMsg::Close => break,
        _ => {}
      }
    }

    Ok(ExecResult {
      exit,
      stdout: String::from_utf8_lossy(&stdout).into_owned(),
      stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
  }
}

impl Default for SshExecutor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
  async fn run(
    &self,
    host: &str,
    _user: &str,
    cmd: &str,
    stdin: Option<&[u8]>,
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    tokio::time::timeout(timeout, self.exec_command(host, cmd, stdin))
      .await
      .map_err(|_| anyhow::anyhow!("ssh command on {host} timed out after {timeout:?}"))?
  }

  /// No SFTP subsystem is wired up; files move through the same exec
  /// channel as commands, which is sufficient for the text/binary configs
  /// and secrets this executor ever transfers.
  async fn upload(&self, host: &str, _user: &str, path: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let command = format!("mkdir -p \"$(dirname '{path}')\" && cat > '{path}'");
    let result = self.exec_command(host, &command, Some(bytes)).await?;
    if !result.success() {
      return Err(anyhow::anyhow!("upload to {host}:{path} failed: {}", result.stderr));
    }
    Ok(())
  }

  async fn download(&self, host: &str, _user: &str, path: &str) -> anyhow::Result<Vec<u8>> {
    let command = format!("cat '{path}'");
    let result = self.exec_command(host, &command, None).await?;
    if !result.success() {
      return Err(anyhow::anyhow!("download from {host}:{path} failed: {}", result.stderr));
    }
    Ok(result.stdout.into_bytes())
  }

  async fn exec_in_container(
    &self,
    host: &str,
    _user: &str,
    container: &str,
    cmd: &[String],
    timeout: Duration,
  ) -> anyhow::Result<ExecResult> {
    let quoted = cmd.iter().map(|arg| shell_quote(arg)).collect::<Vec<_>>().join(" ");
    let command = format!("docker exec {container} {quoted}");
    tokio::time::timeout(timeout, self.exec_command(host, &command, None))
      .await
      .map_err(|_| anyhow::anyhow!("exec in container {container} on {host} timed out after {timeout:?}"))?
  }
}

fn shell_quote(arg: &str) -> String {
  format!("'{}'", arg.replace('\'', r"'\''"))
}
