//! Runtime configuration
//!
//! Credentials and portal settings come from the process environment, which
//! may be seeded from a `.env` file in the working directory. Anything still
//! missing is asked for on the terminal.

use std::env;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default portal root; all endpoints are relative to it
pub const DEFAULT_BASE_URL: &str = "https://www.pesuacademy.com/Academy";

const USERNAME_KEYS: [&str; 2] = ["SRN", "PESU_USERNAME"];
const PASSWORD_KEYS: [&str; 2] = ["PASSWORD", "PESU_PASSWORD"];

/// SRN and password for one run
#[derive(Clone)]
pub struct Credentials {
    pub srn: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("srn", &self.srn)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// The SRN is trimmed; the password is used exactly as given
    pub fn new(srn: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let srn = srn.into().trim().to_string();
        let password = password.into();
        if srn.is_empty() || password.is_empty() {
            return Err(Error::Config(
                "SRN and password are both required".to_string(),
            ));
        }
        Ok(Self { srn, password })
    }

    /// Read credentials from the environment, prompting for whatever is missing
    pub fn load_or_prompt() -> Result<Self> {
        let srn = match first_env(&USERNAME_KEYS) {
            Some(srn) => srn,
            None => prompt_line("Username (SRN): ")?,
        };
        let password = match first_env(&PASSWORD_KEYS) {
            Some(password) => password,
            None => rpassword::prompt_password("Password: ")?,
        };
        Self::new(srn, password)
    }
}

/// Portal connection settings
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal root such as `https://www.pesuacademy.com/Academy`
    pub base_url: String,
    /// Download attempts per resource before giving up
    pub download_attempts: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            download_attempts: 2,
            timeout_secs: 120,
        }
    }
}

impl PortalConfig {
    /// Defaults overridden by `PESU_BASE_URL`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("PESU_BASE_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.base_url = url.to_string();
            }
        }
        config
    }
}

/// Outcome of looking for a `.env` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    Missing,
    Unreadable(String),
}

impl DotenvStatus {
    fn from_result(result: std::result::Result<PathBuf, dotenvy::Error>) -> Self {
        match result {
            Ok(path) => DotenvStatus::Loaded(path),
            Err(e) if e.not_found() => DotenvStatus::Missing,
            Err(e) => DotenvStatus::Unreadable(e.to_string()),
        }
    }

    /// Report the outcome; call once logging is set up
    pub fn log(&self) {
        match self {
            DotenvStatus::Loaded(path) => {
                tracing::debug!(path = %path.display(), "loaded environment file")
            }
            DotenvStatus::Missing => {}
            DotenvStatus::Unreadable(reason) => {
                tracing::warn!("ignoring unreadable .env file: {}", reason)
            }
        }
    }
}

/// Load `.env` from the working directory if present
///
/// Variables already set in the environment take precedence. Call before
/// argument parsing and log the returned status once logging is up.
pub fn load_dotenv() -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::dotenv())
}

/// First non-blank value among `keys`, untrimmed
fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn prompt_line(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_both_fields() {
        assert!(Credentials::new("PES1UG23CS001", "").is_err());
        assert!(Credentials::new("   ", "secret").is_err());
        let creds = Credentials::new(" PES1UG23CS001 ", "secret").unwrap();
        assert_eq!(creds.srn, "PES1UG23CS001");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_password_whitespace_is_preserved() {
        let creds = Credentials::new("PES1UG23CS001", "  pass phrase ").unwrap();
        assert_eq!(creds.password, "  pass phrase ");
    }

    #[test]
    fn test_dotenv_status() {
        let found = DotenvStatus::from_result(Ok(PathBuf::from(".env")));
        assert_eq!(found, DotenvStatus::Loaded(PathBuf::from(".env")));

        let absent = io::Error::new(io::ErrorKind::NotFound, "no .env");
        assert_eq!(
            DotenvStatus::from_result(Err(dotenvy::Error::Io(absent))),
            DotenvStatus::Missing
        );

        let garbled = dotenvy::Error::LineParse("NOT VALID '".to_string(), 4);
        let status = DotenvStatus::from_result(Err(garbled));
        assert!(matches!(status, DotenvStatus::Unreadable(reason) if reason.contains("NOT VALID")));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("PES1UG23CS001", "hunter2").unwrap();
        let shown = format!("{:?}", creds);
        assert!(shown.contains("PES1UG23CS001"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_portal_config_defaults() {
        let config = PortalConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.download_attempts, 2);
    }
}
