//! Portal credential storage.
//!
//! A two-line plaintext file: username on the first line, password on the
//! second. When the file is missing the user is prompted once and the
//! answers are persisted for subsequent runs.

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::info;

use crate::error::BookingError;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Read credentials from `path`, or prompt interactively and create the
/// file. Fails before any browser session is opened.
pub fn load_or_prompt(path: &Path) -> Result<Credentials, BookingError> {
    if path.exists() {
        Ok(read(path)?)
    } else {
        let credentials = prompt()?;
        store(path, &credentials)?;
        info!(path = %path.display(), "credential file created");
        Ok(credentials)
    }
}

fn read(path: &Path) -> io::Result<Credentials> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines().map(str::trim);

    let username = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: missing username on line 1", path.display()),
            )
        })?;
    let password = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: missing password on line 2", path.display()),
            )
        })?;

    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn store(path: &Path, credentials: &Credentials) -> io::Result<()> {
    std::fs::write(
        path,
        format!("{}\n{}\n", credentials.username, credentials.password),
    )
}

fn prompt() -> io::Result<Credentials> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let mut ask = |label: &str| -> io::Result<String> {
        print!("{label}: ");
        io::stdout().flush()?;
        let line = lines.next().unwrap_or_else(|| {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed during credential prompt",
            ))
        })?;
        Ok(line.trim().to_string())
    };

    let username = ask("Input username")?;
    let password = ask("Input password")?;
    Ok(Credentials { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".credentials");

        store(
            &path,
            &Credentials {
                username: "golfer".into(),
                password: "s3cret".into(),
            },
        )
        .unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.username, "golfer");
        assert_eq!(loaded.password, "s3cret");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".credentials");
        std::fs::write(&path, "  golfer \n\ts3cret\t\n").unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.username, "golfer");
        assert_eq!(loaded.password, "s3cret");
    }

    #[test]
    fn single_line_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".credentials");
        std::fs::write(&path, "golfer\n").unwrap();

        let err = read(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
