use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use tracing::{debug, warn};

use super::locator::{RemoteLocation, ServerKey};
use super::transport::{Connection, ConnectionPool, Connector, PooledTransport};
use crate::error::TransferError;

const PASSWORD_ENV: &str = "SSHPASS";

/// Opens sessions with the system `ssh` client as a control master, so the
/// password (if any) is handed over once per server through `sshpass -e`.
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    control_dir: PathBuf,
}

impl OpenSshConnector {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        OpenSshConnector {
            control_dir: control_dir.into(),
        }
    }
}

impl Default for OpenSshConnector {
    fn default() -> Self {
        OpenSshConnector::new(std::env::temp_dir())
    }
}

impl Connector for OpenSshConnector {
    fn connect(&self, location: &RemoteLocation) -> Result<Arc<dyn Connection>, TransferError> {
        let server = location.server();
        let control_path = self.control_dir.join(format!(
            "hummingbird-{}-{}-{}.sock",
            server.user, server.host, server.port
        ));

        let mut command = client(&location.password, "ssh");
        command
            .args(["-M", "-N", "-f"])
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .args(["-o", "ControlPersist=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-p")
            .arg(server.port.to_string());
        if location.password.is_empty() {
            command.args(["-o", "BatchMode=yes"]);
        }
        command.arg(format!("{}@{}", server.user, server.host));

        debug!(%server, "opening control master");
        let output = run(&mut command, &location.password).map_err(|e| {
            TransferError::Connection {
                host: server.host.clone(),
                port: server.port,
                message: e.to_string(),
            }
        })?;
        if !output.status.success() {
            let message = stderr_of(&output);
            // ssh exits with 255 on connection errors; sshpass uses 5 for a bad password
            if output.status.code() == Some(5) || message.contains("Permission denied") {
                return Err(TransferError::Authentication {
                    user: server.user,
                    host: server.host,
                });
            }
            return Err(TransferError::Connection {
                host: server.host,
                port: server.port,
                message,
            });
        }

        Ok(Arc::new(OpenSshSession {
            server,
            control_path,
        }))
    }
}

/// A live control master; closed when dropped.
#[derive(Debug)]
pub struct OpenSshSession {
    server: ServerKey,
    control_path: PathBuf,
}

impl OpenSshSession {
    fn scp(&self, from: &str, to: &str, path: &str) -> Result<(), TransferError> {
        let mut command = Command::new("scp");
        command
            .arg("-q")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-P")
            .arg(self.server.port.to_string())
            .arg(from)
            .arg(to);

        let output = run(&mut command, "").map_err(|e| TransferError::Copy {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(TransferError::Copy {
                path: path.to_string(),
                message: stderr_of(&output),
            });
        }
        Ok(())
    }

    fn target(&self, path: &str) -> String {
        format!("{}@{}:{}", self.server.user, self.server.host, path)
    }
}

impl Connection for OpenSshSession {
    fn upload(&self, local: &Path, remote_path: &str) -> Result<(), TransferError> {
        let local = local.to_string_lossy();
        self.scp(&local, &self.target(remote_path), remote_path)
    }

    fn download(&self, remote_path: &str, local: &Path) -> Result<(), TransferError> {
        let local = local.to_string_lossy();
        self.scp(&self.target(remote_path), &local, remote_path)
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        let status = Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .args(["-O", "exit"])
            .arg(format!("{}@{}", self.server.user, self.server.host))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            warn!(server = %self.server, error = %e, "cannot close control master");
        }
    }
}

/// Transport backed by the system OpenSSH client.
pub fn openssh_transport(control_dir: impl Into<PathBuf>, attempts: usize) -> PooledTransport {
    PooledTransport::new(
        ConnectionPool::new(OpenSshConnector::new(control_dir)).with_attempts(attempts),
    )
}

fn client(password: &str, program: &str) -> Command {
    if password.is_empty() {
        Command::new(program)
    } else {
        let mut command = Command::new("sshpass");
        command.arg("-e").arg(program);
        command
    }
}

fn run(command: &mut Command, password: &str) -> std::io::Result<Output> {
    if !password.is_empty() {
        command.env(PASSWORD_ENV, password);
    }
    command.stdin(Stdio::null()).output()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
