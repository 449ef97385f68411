//! Credentials and per-invocation settings.
//!
//! The API key text has the form `<domain> api:key-<hex>` and is looked up
//! in order:
//! - the `MAILGUNKEY` environment variable,
//! - `$HOME/.mailgun.key`,
//! - `/etc/mailgun.key`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable holding the key text.
pub const KEY_ENV: &str = "MAILGUNKEY";

/// Per-user key file, relative to the home directory.
pub const USER_KEY_FILE: &str = ".mailgun.key";

/// System-wide key file.
pub const SYSTEM_KEY_FILE: &str = "/etc/mailgun.key";

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.mailgun.net/v3";

/// Basic-auth principal for every request.
pub const API_USER: &str = "api";

/// Sending domain and API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Sending domain, also the local-domain default for bare mailboxes.
    pub domain: String,
    /// API key (`key-...`).
    pub api_key: String,
}

impl Credentials {
    /// Creates credentials directly.
    #[must_use]
    pub fn new(domain: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            api_key: api_key.into(),
        }
    }

    /// Parses key text read from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the text is exactly a domain
    /// containing `.` followed by an `api:key-` token.
    pub fn parse(source: &str, text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        match fields.as_slice() {
            [domain, key] if domain.contains('.') && key.starts_with("api:key-") => {
                Ok(Self::new(*domain, key.strip_prefix("api:").unwrap_or(*key)))
            }
            _ => Err(Error::Config(format!(
                "malformed mailgun API key in {source}"
            ))),
        }
    }

    /// Loads credentials from the environment or the key files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the first available source is malformed
    /// or no source is readable.
    pub fn load() -> Result<Self> {
        let env = std::env::var(KEY_ENV).ok();
        let user_file = dirs::home_dir().map(|home| home.join(USER_KEY_FILE));
        Self::load_from(env.as_deref(), user_file.as_deref(), Path::new(SYSTEM_KEY_FILE))
    }

    /// Loads credentials from explicit sources, in priority order.
    ///
    /// # Errors
    ///
    /// See [`Credentials::load`].
    pub fn load_from(env: Option<&str>, user_file: Option<&Path>, system_file: &Path) -> Result<Self> {
        if let Some(text) = env.filter(|t| !t.is_empty()) {
            return Self::parse(&format!("${KEY_ENV}"), text);
        }

        if let Some(path) = user_file {
            match std::fs::read_to_string(path) {
                Ok(text) => return Self::parse(&path.display().to_string(), &text),
                Err(e) => debug!("No key in {}: {e}", path.display()),
            }
        }

        std::fs::read_to_string(system_file)
            .map_err(|e| Error::Config(format!("reading {}: {e}", system_file.display())))
            .and_then(|text| Self::parse(&system_file.display().to_string(), &text))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Who ran the command, for log records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Login name (`$USER`).
    pub user: String,
    /// Process arguments, program name included.
    pub args: Vec<String>,
}

impl Invocation {
    /// Captures the current process.
    #[must_use]
    pub fn current() -> Self {
        Self::from_os(std::env::var_os("USER"), std::env::args_os())
    }

    /// Builds a record from raw OS strings. Text that is not valid
    /// Unicode is kept with replacement characters.
    #[must_use]
    pub fn from_os(user: Option<OsString>, args: impl IntoIterator<Item = OsString>) -> Self {
        Self {
            user: user
                .map(|u| u.to_string_lossy().into_owned())
                .unwrap_or_default(),
            args: args
                .into_iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        }
    }

    /// Returns the program name without its directory.
    #[must_use]
    pub fn program(&self) -> String {
        self.args
            .first()
            .map(PathBuf::from)
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "mgrelay".to_string())
    }
}

/// Settings for one run, fixed at startup.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)] // independent command-line toggles
pub struct Config {
    /// API credentials.
    pub credentials: Credentials,
    /// API base URL (no trailing slash).
    pub api_base: String,
    /// Invoking user and arguments.
    pub invocation: Invocation,
    /// Print status lines even when input is not a terminal.
    pub verbose: bool,
    /// Dump the HTTP request and response to the console.
    pub debug_http: bool,
    /// Encode everything but skip the network call.
    pub disable_mail: bool,
    /// Standard input is a terminal.
    pub interactive: bool,
}

impl Config {
    /// Creates a configuration with default API base and all toggles off.
    #[must_use]
    pub fn new(credentials: Credentials, invocation: Invocation) -> Self {
        Self {
            credentials,
            api_base: DEFAULT_API_BASE.to_string(),
            invocation,
            verbose: false,
            debug_http: false,
            disable_mail: false,
            interactive: false,
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the local-domain default.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.credentials.domain
    }

    /// Returns the URL for an endpoint path under the sending domain.
    #[must_use]
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}/{path}", self.api_base, self.credentials.domain)
    }

    /// Returns true if the human-readable status line should be printed.
    #[must_use]
    pub const fn announce(&self) -> bool {
        self.interactive || self.verbose
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mgrelay-{}-{name}", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_key() {
        let creds = Credentials::parse("test", "mg.example.com api:key-0123abcd\n").unwrap();
        assert_eq!(creds.domain, "mg.example.com");
        assert_eq!(creds.api_key, "key-0123abcd");
    }

    #[test]
    fn test_parse_key_malformed() {
        for text in ["", "mg.example.com", "example api:key-1", "mg.example.com key-1", "a.b api:key-1 extra"] {
            let err = Credentials::parse("$MAILGUNKEY", text).unwrap_err();
            assert_eq!(err.to_string(), "malformed mailgun API key in $MAILGUNKEY");
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = Credentials::new("mg.example.com", "key-secret");
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[test]
    fn test_load_prefers_env() {
        let user = temp_file("env-user", "user.example.com api:key-user");
        let creds = Credentials::load_from(
            Some("env.example.com api:key-env"),
            Some(&user),
            Path::new("/nonexistent/mailgun.key"),
        )
        .unwrap();
        assert_eq!(creds.domain, "env.example.com");
        std::fs::remove_file(user).unwrap();
    }

    #[test]
    fn test_load_falls_back_to_system_file() {
        let system = temp_file("system", "sys.example.com api:key-sys\n");
        let creds = Credentials::load_from(
            None,
            Some(Path::new("/nonexistent/.mailgun.key")),
            &system,
        )
        .unwrap();
        assert_eq!(creds.domain, "sys.example.com");
        assert_eq!(creds.api_key, "key-sys");
        std::fs::remove_file(system).unwrap();
    }

    #[test]
    fn test_load_malformed_user_file_is_fatal() {
        let user = temp_file("bad-user", "garbage");
        let system = temp_file("good-system", "sys.example.com api:key-sys");
        let err = Credentials::load_from(None, Some(&user), &system).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        std::fs::remove_file(user).unwrap();
        std::fs::remove_file(system).unwrap();
    }

    #[test]
    fn test_load_nothing_available() {
        let err = Credentials::load_from(None, None, Path::new("/nonexistent/mailgun.key"))
            .unwrap_err();
        assert!(err.to_string().starts_with("reading /nonexistent/mailgun.key"));
    }

    #[test]
    fn test_endpoint_url() {
        let config = Config::new(
            Credentials::new("mg.example.com", "key-1"),
            Invocation::default(),
        )
        .with_api_base("http://127.0.0.1:8080/v3/");
        assert_eq!(
            config.endpoint_url("messages.mime"),
            "http://127.0.0.1:8080/v3/mg.example.com/messages.mime"
        );
    }

    #[test]
    fn test_program_name() {
        let invocation = Invocation {
            user: "root".into(),
            args: vec!["/usr/sbin/mailgun-sendmail".into(), "-t".into()],
        };
        assert_eq!(invocation.program(), "mailgun-sendmail");
    }

    #[cfg(unix)]
    #[test]
    fn test_invocation_from_non_unicode_args() {
        use std::os::unix::ffi::OsStringExt;

        let invocation = Invocation::from_os(
            Some("root".into()),
            [
                OsString::from("mailgun-mail"),
                OsString::from("-s"),
                OsString::from_vec(b"caf\xe9".to_vec()),
            ],
        );
        assert_eq!(invocation.user, "root");
        assert_eq!(invocation.args, ["mailgun-mail", "-s", "caf\u{fffd}"]);
        assert_eq!(invocation.program(), "mailgun-mail");

        assert!(Invocation::from_os(None, []).user.is_empty());
    }
}
