// INI-backed configuration store
// Line-preserving parse/rewrite so unrelated sections and comments survive a save

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, PersistenceError};

/// Section holding NSP credentials and token state
pub const NSP_SECTION: &str = "NSP";

/// Section owned by the Kafka consumer; preserved untouched
pub const KAFKA_SECTION: &str = "KAFKA";

/// File permissions for the store and exported token files (Unix only)
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Legacy key names accepted in the NSP section
const NSP_ALIASES: &[(&str, &str)] = &[("nsp_server", "server"), ("username", "user")];

const KNOWN_NSP_KEYS: &[&str] = &[
    "server",
    "nsp_server",
    "user",
    "username",
    "password",
    "verify_ssl",
    "token_file",
    "working_hours",
    "timezone",
    "bearer_token",
    "access_token",
    "refresh_token",
    "token_expiry",
];

const KNOWN_KAFKA_KEYS: &[&str] = &[
    "bootstrap_servers",
    "security_protocol",
    "ssl_cafile",
    "ssl_certfile",
    "ssl_keyfile",
    "ssl_password",
    "ssl_check_hostname",
    "group_id",
    "default_topics",
    "consumer_timeout_ms",
    "enable_auto_commit",
    "auto_offset_reset",
    "max_poll_records",
    "value_deserializer",
    "key_deserializer",
];

#[derive(Debug, Clone)]
enum Line {
    /// Blank line or comment, kept verbatim
    Verbatim(String),

    Section { name: String, raw: String },

    /// `raw` is the original text; cleared once the value is changed
    Entry {
        section: String,
        key: String,
        value: String,
        raw: Option<String>,
    },
}

/// Durable section/key-value store over an INI file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    lines: Vec<Line>,
}

impl ConfigStore {
    /// Load and parse the store at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let store = Self::read(path.as_ref())?;
        store.warn_unknown_keys();
        Ok(store)
    }

    /// Re-read the same file without repeating schema warnings
    pub fn reload(&self) -> Result<Self, ConfigError> {
        Self::read(&self.path)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut store = Self::parse(path, &content)?;
        store.resolve_aliases();
        Ok(store)
    }

    /// Parse INI text without touching the filesystem
    pub fn parse(path: impl AsRef<Path>, content: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let mut lines = Vec::new();
        let mut current: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(Line::Verbatim(raw.to_string()));
                continue;
            }

            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                let name = name.trim().to_string();
                current = Some(name.clone());
                lines.push(Line::Section {
                    name,
                    raw: raw.to_string(),
                });
                continue;
            }

            let parse_error = || ConfigError::Parse {
                path: path.clone(),
                line: idx + 1,
                content: raw.to_string(),
            };

            let section = current.clone().ok_or_else(parse_error)?;
            let split_at = trimmed.find(['=', ':']).ok_or_else(parse_error)?;
            let key = trimmed[..split_at].trim().to_lowercase();
            if key.is_empty() {
                return Err(parse_error());
            }
            let value = trimmed[split_at + 1..].trim().to_string();

            lines.push(Line::Entry {
                section,
                key,
                value,
                raw: Some(raw.to_string()),
            });
        }

        Ok(Self { path, lines })
    }

    /// Path the store was loaded from and will be saved to
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, Line::Section { name, .. } if name == section))
    }

    /// Names of all sections in file order, without duplicates
    pub fn sections(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for line in &self.lines {
            if let Line::Section { name, .. } = line {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Keys of a section, in file order
    pub fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for line in &self.lines {
            if let Line::Entry { section: s, key, .. } = line {
                if s == section && !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Get a value, failing when the section or key is absent
    pub fn get(&self, section: &str, key: &str) -> Result<&str, ConfigError> {
        if !self.has_section(section) {
            return Err(ConfigError::MissingSection(section.to_string()));
        }
        self.get_opt(section, key)
            .ok_or_else(|| ConfigError::MissingField {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    /// Get a value if present; later duplicates win
    pub fn get_opt(&self, section: &str, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry {
                section: s,
                key: k,
                value,
                ..
            } if s == section && *k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Set a value in place, appending the key (and section) when absent
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let key = key.to_lowercase();
        let value = value.into();

        let existing = self.lines.iter_mut().rev().find(|line| {
            matches!(line, Line::Entry { section: s, key: k, .. } if s == section && *k == key)
        });

        if let Some(Line::Entry {
            value: current,
            raw,
            ..
        }) = existing
        {
            if *current != value {
                *current = value;
                *raw = None;
            }
            return;
        }

        let entry = Line::Entry {
            section: section.to_string(),
            key,
            value,
            raw: None,
        };

        match self.section_end(section) {
            Some(at) => self.lines.insert(at, entry),
            None => {
                if !self.lines.is_empty() {
                    self.lines.push(Line::Verbatim(String::new()));
                }
                self.lines.push(Line::Section {
                    name: section.to_string(),
                    raw: format!("[{}]", section),
                });
                self.lines.push(entry);
            }
        }
    }

    /// Index after the last entry of the last block of `section`
    fn section_end(&self, section: &str) -> Option<usize> {
        let mut end = None;
        let mut inside = false;
        for (idx, line) in self.lines.iter().enumerate() {
            match line {
                Line::Section { name, .. } => {
                    inside = name == section;
                    if inside {
                        end = Some(idx + 1);
                    }
                }
                Line::Entry { .. } if inside => end = Some(idx + 1),
                _ => {}
            }
        }
        end
    }

    /// Serialize back to INI text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(raw) | Line::Section { raw, .. } => out.push_str(raw),
                Line::Entry { raw: Some(raw), .. } => out.push_str(raw),
                Line::Entry {
                    key,
                    value,
                    raw: None,
                    ..
                } => {
                    out.push_str(key);
                    out.push_str(" = ");
                    out.push_str(value);
                }
            }
            out.push('\n');
        }
        out
    }

    /// Atomically rewrite the store file
    pub fn save(&self) -> Result<(), PersistenceError> {
        write_atomic(&self.path, &self.render())?;
        tracing::debug!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }

    /// Map legacy key names onto their canonical names when the canonical key is absent
    fn resolve_aliases(&mut self) {
        for (alias, canonical) in NSP_ALIASES {
            if self.get_opt(NSP_SECTION, canonical).is_some() {
                continue;
            }
            for line in self.lines.iter_mut() {
                if let Line::Entry { section, key, .. } = line {
                    if section == NSP_SECTION && key == alias {
                        tracing::debug!(
                            alias = %alias,
                            canonical = %canonical,
                            "Resolved legacy key"
                        );
                        *key = canonical.to_string();
                    }
                }
            }
        }
    }

    fn warn_unknown_keys(&self) {
        for section in self.sections() {
            let known = match section.as_str() {
                NSP_SECTION => KNOWN_NSP_KEYS,
                KAFKA_SECTION => KNOWN_KAFKA_KEYS,
                _ => {
                    tracing::warn!(
                        section = %section,
                        path = %self.path.display(),
                        "Unknown configuration section will be ignored (known: KAFKA, NSP)"
                    );
                    continue;
                }
            };

            for key in self.keys(&section) {
                if !known.contains(&key.as_str()) {
                    tracing::warn!(
                        section = %section,
                        key = %key,
                        path = %self.path.display(),
                        "Unknown configuration key will be ignored"
                    );
                }
            }
        }
    }
}

/// Write `content` to a sibling temp file, fsync it, then rename over `path`
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<(), PersistenceError> {
    use std::io::Write;

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let write_err = |source| PersistenceError::Write {
        path: temp_path.clone(),
        source,
    };

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(&temp_path).map_err(write_err)?;
    // A stale temp file left by a crashed run keeps its old mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(FILE_MODE))
            .map_err(write_err)?;
    }
    file.write_all(content.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    if let Err(source) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    #[cfg(unix)]
    sync_parent_dir(path);

    Ok(())
}

/// Flush the directory entry so the rename survives a crash
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if let Err(e) = std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!(
            path = %parent.display(),
            error = %e,
            "Failed to sync directory after rename"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# NSP consumer configuration
[NSP]
server = 10.0.0.5
user = admin
password = secret
token_expiry =

[KAFKA]
bootstrap_servers = 10.0.0.5:9192
group_id = nsp-consumer
";

    fn write_sample(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("nsp_config.ini");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigStore::load(dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_get_values() {
        let store = ConfigStore::parse("test.ini", SAMPLE).unwrap();
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "10.0.0.5");
        assert_eq!(store.get(NSP_SECTION, "token_expiry").unwrap(), "");
        assert_eq!(
            store.get(KAFKA_SECTION, "group_id").unwrap(),
            "nsp-consumer"
        );
    }

    #[test]
    fn test_get_missing() {
        let store = ConfigStore::parse("test.ini", SAMPLE).unwrap();
        assert!(matches!(
            store.get(NSP_SECTION, "refresh_token"),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            store.get("OTHER", "server"),
            Err(ConfigError::MissingSection(_))
        ));
        assert!(store.get_opt("OTHER", "server").is_none());
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let store = ConfigStore::parse("test.ini", "[NSP]\nServer = nsp.lab\n").unwrap();
        assert_eq!(store.get(NSP_SECTION, "SERVER").unwrap(), "nsp.lab");
    }

    #[test]
    fn test_colon_separator() {
        let store = ConfigStore::parse("test.ini", "[NSP]\nserver: nsp.lab\n").unwrap();
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "nsp.lab");
    }

    #[test]
    fn test_parse_errors() {
        let err = ConfigStore::parse("test.ini", "server = orphan\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));

        let err = ConfigStore::parse("test.ini", "[NSP]\nnot a pair\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_set_preserves_other_lines() {
        let mut store = ConfigStore::parse("test.ini", SAMPLE).unwrap();
        store.set(NSP_SECTION, "token_expiry", "1700000000.5");
        store.set(NSP_SECTION, "access_token", "abc");

        let rendered = store.render();
        assert!(rendered.starts_with("# NSP consumer configuration\n[NSP]\n"));
        assert!(rendered.contains("password = secret\ntoken_expiry = 1700000000.5\n"));
        assert!(rendered.contains("token_expiry = 1700000000.5\naccess_token = abc\n\n[KAFKA]"));
        assert!(rendered.contains("[KAFKA]\nbootstrap_servers = 10.0.0.5:9192\n"));
    }

    #[test]
    fn test_set_creates_section() {
        let mut store = ConfigStore::parse("test.ini", "[KAFKA]\ngroup_id = g\n").unwrap();
        store.set(NSP_SECTION, "server", "nsp.lab");
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "nsp.lab");
        assert!(store.render().ends_with("\n[NSP]\nserver = nsp.lab\n"));
    }

    #[test]
    fn test_unchanged_value_keeps_raw_formatting() {
        let mut store = ConfigStore::parse("test.ini", "[NSP]\nuser=admin\n").unwrap();
        store.set(NSP_SECTION, "user", "admin");
        assert_eq!(store.render(), "[NSP]\nuser=admin\n");
    }

    #[test]
    fn test_aliases_resolved_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "[NSP]\nnsp_server = nsp.lab\nusername = admin\n");
        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "nsp.lab");
        assert_eq!(store.get(NSP_SECTION, "user").unwrap(), "admin");
    }

    #[test]
    fn test_canonical_key_beats_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "[NSP]\nnsp_server = old.lab\nserver = new.lab\n");
        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "new.lab");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, SAMPLE);

        let mut store = ConfigStore::load(&path).unwrap();
        store.set(NSP_SECTION, "refresh_token", "r-1");
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.get(NSP_SECTION, "refresh_token").unwrap(), "r-1");
        assert_eq!(
            reloaded.get(KAFKA_SECTION, "bootstrap_servers").unwrap(),
            "10.0.0.5:9192"
        );
        assert!(!dir.path().join("nsp_config.ini.tmp").exists());
    }

    #[test]
    fn test_reload_sees_external_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "[NSP]\nnsp_server = old.lab\n");
        let store = ConfigStore::load(&path).unwrap();

        std::fs::write(&path, "[NSP]\nnsp_server = new.lab\n").unwrap();
        let reloaded = store.reload().unwrap();
        assert_eq!(reloaded.get(NSP_SECTION, "server").unwrap(), "new.lab");
        assert_eq!(store.get(NSP_SECTION, "server").unwrap(), "old.lab");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_sets_restrictive_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, SAMPLE);
        let store = ConfigStore::load(&path).unwrap();
        store.save().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_over_stale_temp_file_resets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, SAMPLE);
        let stale = dir.path().join("nsp_config.ini.tmp");
        std::fs::write(&stale, "leftover").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        store.save().unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
    }
}
