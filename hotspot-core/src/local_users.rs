use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The portal's credential store: a `username:password` flat file.
///
/// Reloadable at runtime (the daemon re-reads it on SIGHUP), shared across
/// tasks by cloning. Hashing strength and schema are outside this layer;
/// whatever sits in the file is what login posts are compared against.
#[derive(Debug, Clone, Default)]
pub struct CredentialFile {
    users: Arc<RwLock<HashMap<String, String>>>,
}

impl CredentialFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the in-memory credentials with the contents of `path`.
    ///
    /// One `username:password` pair per line; blank lines and lines starting
    /// with `#` are skipped, malformed lines are logged and skipped.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        info!("Loading portal credentials from {}", path.display());

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut users = self.users.write().unwrap();
        users.clear();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((username, password)) = line.split_once(':') {
                users.insert(username.to_string(), password.to_string());
            } else {
                warn!("Skipping malformed credential line: {}", line);
            }
        }

        info!("Loaded {} portal user(s).", users.len());
        Ok(())
    }

    pub fn verify_password(&self, username: &str, password: &str) -> bool {
        let users = self.users.read().unwrap();
        users.get(username).map_or(false, |stored| stored == password)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
