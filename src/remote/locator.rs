use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TransferError;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// `user[.password]@host[:port]:path`, matched against the whole string.
static REMOTE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.+(\..+)?@.+(:(\d)+)?:.+$").expect("remote path pattern"));

/// Identity of a remote server; one cached connection exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// A file location on a remote host, resolved from a compact remote path.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub remote_dir: String,
    pub remote_file: String,
    pub full_path: String,
}

impl RemoteLocation {
    pub fn server(&self) -> ServerKey {
        ServerKey {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
        }
    }
}

impl fmt::Debug for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("RemoteLocation")
            .field("user", &self.user)
            .field("password", &password)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("remote_dir", &self.remote_dir)
            .field("remote_file", &self.remote_file)
            .field("full_path", &self.full_path)
            .finish()
    }
}

/// Whether `path` names a file on a remote host rather than a local file.
pub fn is_remote(path: &str) -> bool {
    REMOTE_PATH.is_match(path)
}

/// Resolves a remote path such as `hadoop.123@master:22:~/csv-data/result.csv`.
///
/// The password is whatever follows the first `.` of the user part. The port
/// is taken from the segment after the host when that segment is all digits,
/// otherwise it defaults to 22 and everything after the host is the path.
pub fn resolve(path: &str) -> Result<RemoteLocation, TransferError> {
    let illegal = || TransferError::IllegalAddress(path.to_string());
    if !is_remote(path) {
        return Err(illegal());
    }

    let (credentials, address) = path.split_once('@').ok_or_else(illegal)?;
    let credentials = credentials.trim();
    let (user, password) = match credentials.split_once('.') {
        Some((user, password)) => (user.trim(), password.trim()),
        None => (credentials, ""),
    };

    let (host, rest) = address.trim().split_once(':').ok_or_else(illegal)?;
    let host = host.trim();
    if user.is_empty() || host.is_empty() || host.contains('@') {
        return Err(illegal());
    }

    let (port, full_path) = match rest.split_once(':') {
        Some((port, remainder))
            if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let port: u16 = port.parse().map_err(|_| illegal())?;
            (port, remainder.trim())
        }
        _ => (DEFAULT_SSH_PORT, rest.trim()),
    };
    if full_path.is_empty() {
        return Err(illegal());
    }

    let (remote_dir, remote_file) = match full_path.rsplit_once('/') {
        Some((dir, file)) => (if dir.is_empty() { "/" } else { dir }, file),
        None => (".", full_path),
    };

    Ok(RemoteLocation {
        user: user.to_string(),
        password: password.to_string(),
        host: host.to_string(),
        port,
        remote_dir: remote_dir.to_string(),
        remote_file: remote_file.to_string(),
        full_path: full_path.to_string(),
    })
}
