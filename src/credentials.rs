//! Credential providers.
//!
//! The engine asks a [`CredentialProvider`] for a credential before each
//! request it authenticates and reports back whether the server accepted it.

use indexmap::IndexMap;
use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Stdio};
use url::Url;

use crate::Error;

/// A set of credential fields, at least `username` and `password`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    fields: IndexMap<String, String>,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        let mut fields = IndexMap::new();
        fields.insert("username".to_string(), username.to_string());
        fields.insert("password".to_string(), password.to_string());
        Credential { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn username(&self) -> &str {
        self.get("username").unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.get("password").unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username())
            .field("password", &"--")
            .finish()
    }
}

/// Source of credentials, and sink for whether they worked.
///
/// Implementations serialize their own state; the engine may call them
/// from several threads at once.
pub trait CredentialProvider: Send + Sync {
    /// Look up a credential for `url`.
    fn fetch(&self, url: &Url) -> Result<Credential, Error>;

    /// The server accepted `credential`.
    fn approve(&self, credential: &Credential);

    /// The server refused `credential`.
    fn reject(&self, credential: &Credential);
}

/// Always hands out the same username and password.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credential: Credential,
}

impl StaticCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        StaticCredentials {
            credential: Credential::new(username, password),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn fetch(&self, _url: &Url) -> Result<Credential, Error> {
        Ok(self.credential.clone())
    }

    fn approve(&self, _credential: &Credential) {}

    fn reject(&self, _credential: &Credential) {}
}

/// Delegates to `git credential fill|approve|reject`.
#[derive(Debug, Clone)]
pub struct GitCredentialHelper {
    git: OsString,
}

impl GitCredentialHelper {
    pub fn new() -> Self {
        GitCredentialHelper { git: "git".into() }
    }

    /// Use a specific `git` binary.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        GitCredentialHelper { git: program.into() }
    }

    fn run(&self, action: &str, input: &str) -> Result<String, Error> {
        let mut child = Command::new(&self.git)
            .arg("credential")
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::Credentials(format!("failed to run git credential {}: {}", action, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| Error::Credentials(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Credentials(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Credentials(format!(
                "git credential {} exited with {}",
                action, output.status
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| Error::Credentials("credential helper returned invalid UTF-8".into()))
    }

    fn settle(&self, action: &str, credential: &Credential) {
        let result = encode_fields(credential.iter()).and_then(|input| self.run(action, &input));
        if let Err(err) = result {
            tracing::warn!(%err, action, "credential helper failed");
        }
    }
}

impl Default for GitCredentialHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for GitCredentialHelper {
    fn fetch(&self, url: &Url) -> Result<Credential, Error> {
        let input = encode_fields(describe_url(url).iter().map(|(k, v)| (*k, v.as_str())))?;
        let output = self.run("fill", &input)?;
        let credential = parse_fields(&output);
        if credential.get("username").is_none() || credential.get("password").is_none() {
            return Err(Error::Credentials(format!(
                "no username or password for {}",
                url
            )));
        }
        Ok(credential)
    }

    fn approve(&self, credential: &Credential) {
        self.settle("approve", credential);
    }

    fn reject(&self, credential: &Credential) {
        self.settle("reject", credential);
    }
}

/// The `protocol`/`host`/`path` fields git uses to pick a credential.
fn describe_url(url: &Url) -> Vec<(&'static str, String)> {
    let mut fields = vec![("protocol", url.scheme().to_string())];
    if let Some(host) = url.host_str() {
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        fields.push(("host", host));
    }
    let path = url.path().trim_start_matches('/');
    if !path.is_empty() {
        fields.push(("path", path.to_string()));
    }
    fields
}

/// Serialize fields as `key=value` lines for the helper.
///
/// A newline or NUL would start a new field, so both are refused, as is a
/// key that is empty or contains `=`.
fn encode_fields<'a>(fields: impl Iterator<Item = (&'a str, &'a str)>) -> Result<String, Error> {
    let mut out = String::new();
    for (key, value) in fields {
        if key.is_empty() || key.contains(|c: char| matches!(c, '=' | '\n' | '\0')) {
            return Err(Error::Credentials(format!("invalid credential field name {:?}", key)));
        }
        if value.contains(|c: char| matches!(c, '\n' | '\0')) {
            return Err(Error::Credentials(format!(
                "credential field {} contains a newline or NUL",
                key
            )));
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    Ok(out)
}

fn parse_fields(output: &str) -> Credential {
    let mut credential = Credential::default();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once('=') {
            credential.set(key, value);
        }
    }
    credential
}
