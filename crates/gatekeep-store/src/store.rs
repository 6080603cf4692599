//! The credential store: an in-memory map backed by a text file.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use gatekeep_protocol::IdentityKey;

use crate::format::{self, Line};
use crate::{CredentialRecord, StoreError, StoreSettings};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// What a [`CredentialStore::load`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records now in memory.
    pub records: usize,
    /// Lines that looked meaningful but could not be parsed.
    pub skipped: usize,
    /// `false` when there was no file to read.
    pub file_found: bool,
}

/// Durable mapping from identity to [`CredentialRecord`].
///
/// The in-memory map is authoritative. [`put`](Self::put) never touches the
/// disk; [`save`](Self::save) writes every record, including ones nobody
/// touched this run.
///
/// Not thread-safe on its own. The session controller owns it and the
/// server serializes access with a single lock.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    settings: StoreSettings,
    records: HashMap<IdentityKey, CredentialRecord>,
    /// Bumped on every mutable access, so snapshots can be ordered.
    revision: u64,
}

/// The rendered store at one revision, detached from the store so it can
/// be written without holding whatever guards the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    path: PathBuf,
    text: String,
    revision: u64,
    records: usize,
}

impl StoreSnapshot {
    /// Writes the snapshot, replacing the file.
    ///
    /// The text goes to a `<file>.tmp` sibling first and is then renamed
    /// over the real file, so a reader never sees half a store. The parent
    /// directory is created if needed.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] if any step fails.
    pub fn write(&self) -> Result<(), StoreError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Write { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err(parent))?;
        }

        let tmp = temp_path(&self.path);
        fs::write(&tmp, &self.text).map_err(write_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(write_err(&self.path))?;

        tracing::debug!(
            path = %self.path.display(),
            records = self.records,
            revision = self.revision,
            "credential store saved"
        );
        Ok(())
    }

    /// Store revision this snapshot was taken at. Later snapshots of the
    /// same store have higher revisions.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl CredentialStore {
    /// An empty store with default settings. Nothing is read.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: StoreSettings::default(),
            records: HashMap::new(),
            revision: 0,
        }
    }

    /// Creates a store and loads it, logging (not returning) read failures.
    ///
    /// This is what a server calls at startup: an unreadable file must not
    /// stop the process from coming up.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        match store.load() {
            Ok(report) => tracing::info!(
                path = %store.path.display(),
                records = report.records,
                skipped = report.skipped,
                file_found = report.file_found,
                "credential store loaded"
            ),
            Err(e) => tracing::error!(error = %e, "credential store unreadable, starting empty"),
        }
        store
    }

    /// Reads the store file into memory.
    ///
    /// The file is parsed into a fresh map and swapped in only once every
    /// line has been seen, so a failed read leaves the previous contents in
    /// place. A missing file is not an error and changes nothing.
    ///
    /// # Errors
    /// Returns [`StoreError::Read`] if the file exists but can't be read.
    pub fn load(&mut self) -> Result<LoadReport, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no credential store file yet");
                return Ok(LoadReport {
                    records: self.records.len(),
                    skipped: 0,
                    file_found: false,
                });
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let now = unix_millis();
        let mut settings = StoreSettings::default();
        let mut records = HashMap::new();
        let mut skipped = 0;

        for (index, raw) in text.lines().enumerate() {
            match format::parse_line(raw, now) {
                Ok(Line::Timeout(secs)) => settings.challenge_timeout_secs = secs,
                Ok(Line::TrustWindow(hours)) => settings.trust_window_hours = hours,
                Ok(Line::Record(name, record)) => {
                    records.insert(name, record);
                }
                Ok(Line::Ignored) => {}
                Err(reason) => {
                    skipped += 1;
                    tracing::warn!(line = index + 1, ?reason, "skipping malformed store line");
                }
            }
        }

        self.settings = settings;
        self.records = records;
        self.revision += 1;

        Ok(LoadReport {
            records: self.records.len(),
            skipped,
            file_found: true,
        })
    }

    /// Writes the directives and every record, replacing the file.
    ///
    /// Same as taking a [`snapshot`](Self::snapshot) and writing it on the
    /// spot.
    ///
    /// # Errors
    /// Returns [`StoreError::Write`] if any step fails. The in-memory
    /// state is untouched either way.
    pub fn save(&self) -> Result<(), StoreError> {
        self.snapshot().write()
    }

    /// Renders the store for a later [`StoreSnapshot::write`].
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            path: self.path.clone(),
            text: self.render(),
            revision: self.revision,
            records: self.records.len(),
        }
    }

    /// The exact text [`save`](Self::save) would write.
    pub fn render(&self) -> String {
        format::render(&self.settings, &self.records)
    }

    pub fn get(&self, identity: &IdentityKey) -> Option<&CredentialRecord> {
        self.records.get(identity)
    }

    pub fn get_mut(&mut self, identity: &IdentityKey) -> Option<&mut CredentialRecord> {
        self.revision += 1;
        self.records.get_mut(identity)
    }

    pub fn contains(&self, identity: &IdentityKey) -> bool {
        self.records.contains_key(identity)
    }

    /// Inserts or replaces a record in memory.
    pub fn put(&mut self, identity: IdentityKey, record: CredentialRecord) {
        self.revision += 1;
        self.records.insert(identity, record);
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut StoreSettings {
        self.revision += 1;
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.to_path_buf().into_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    //! Store tests run against real files in a temporary directory.

    use super::*;
    use crate::StoredSecret;

    const ITER: u32 = 8;

    fn key(name: &str) -> IdentityKey {
        IdentityKey::new(name)
    }

    fn record(secret: &str, origin: &str, at: u64) -> CredentialRecord {
        CredentialRecord::new(StoredSecret::hash(secret, ITER), origin, at)
    }

    // =====================================================================
    // load()
    // =====================================================================

    #[test]
    fn test_load_missing_file_leaves_store_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::new(dir.path().join("auth.yml"));

        let report = store.load().expect("missing file is not an error");

        assert!(!report.file_found);
        assert!(store.is_empty());
        assert_eq!(*store.settings(), StoreSettings::default());
    }

    #[test]
    fn test_load_reads_directives_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");
        fs::write(
            &path,
            "login time out:60sec\n\
             ip cache time:2hrs\n\
             \n\
             registered players\n\
             Alice : \"wonder\" : 10.0.0.1 : 1000\n\
             bob : \"builder\" : 10.0.0.2 : 2000\n",
        )
        .unwrap();

        let mut store = CredentialStore::new(&path);
        let report = store.load().unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.settings().challenge_timeout_secs, 60);
        assert_eq!(store.settings().trust_window_millis(), 2 * 3_600_000);

        let alice = store.get(&key("ALICE")).expect("case-insensitive lookup");
        assert!(alice.secret.verify("wonder"));
        assert_eq!(alice.last_origin, "10.0.0.1");
        assert_eq!(alice.last_success_at, 1000);
    }

    #[test]
    fn test_load_skips_malformed_lines_and_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");
        fs::write(
            &path,
            "ip cache time:forever\n\
             broken : \"only-two\"\n\
             carol : \"pw\" : 1.1.1.1 : 5\n\
             stray text without separators\n",
        )
        .unwrap();

        let mut store = CredentialStore::new(&path);
        let report = store.load().unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(report.records, 1);
        assert!(store.contains(&key("carol")));
        // The bad directive left the default in place.
        assert_eq!(store.settings().trust_window_hours, 12);
    }

    #[test]
    fn test_load_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");
        fs::write(&path, "dave : \"pw\" : 1.1.1.1 : 5\n").unwrap();

        let mut store = CredentialStore::new(&path);
        store.put(key("erin"), record("x", "2.2.2.2", 1));
        store.load().unwrap();

        assert!(store.contains(&key("dave")));
        assert!(!store.contains(&key("erin")));
    }

    #[test]
    fn test_load_unreadable_path_returns_read_error_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        // A directory can't be read as a file.
        let mut store = CredentialStore::new(dir.path());
        store.put(key("frank"), record("x", "3.3.3.3", 1));

        let result = store.load();

        assert!(matches!(result, Err(StoreError::Read { .. })));
        assert!(store.contains(&key("frank")));
    }

    // =====================================================================
    // save()
    // =====================================================================

    #[test]
    fn test_save_then_load_reproduces_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");

        let mut store = CredentialStore::new(&path);
        store.settings_mut().trust_window_hours = 6;
        store.put(key("bob"), record("secretA", "9.9.9.9", 1_700_000_000_000));
        store.put(key("amy"), record("pw", "1.2.3.4", 42));
        store.put(
            key("legacy"),
            CredentialRecord::new(StoredSecret::Plain("old".into()), "5.5.5.5", 7),
        );
        store.save().expect("save should succeed");

        let mut reloaded = CredentialStore::new(&path);
        reloaded.load().unwrap();

        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.settings().trust_window_hours, 6);
        for name in ["bob", "amy", "legacy"] {
            assert_eq!(reloaded.get(&key(name)), store.get(&key(name)), "{name}");
        }
        assert!(reloaded.get(&key("bob")).unwrap().secret.verify("secretA"));
    }

    #[test]
    fn test_save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins").join("auth").join("auth.yml");

        let mut store = CredentialStore::new(&path);
        store.put(key("bob"), record("pw", "1.1.1.1", 1));
        store.save().unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("plugins/auth/auth.yml.tmp").exists());
    }

    #[test]
    fn test_save_writes_untouched_records_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");
        fs::write(&path, "old : \"pw\" : 1.1.1.1 : 5\n").unwrap();

        let mut store = CredentialStore::new(&path);
        store.load().unwrap();
        store.put(key("new"), record("pw", "2.2.2.2", 6));
        store.save().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("old : \"pw\" : 1.1.1.1 : 5"));
        assert!(text.contains("new : \"$pbkdf2-sha256$"));
        assert!(text.starts_with("login time out:120sec\nip cache time:12hrs\n"));
    }

    #[test]
    fn test_save_into_file_path_parent_returns_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let store = CredentialStore::new(blocker.join("auth.yml"));

        assert!(matches!(store.save(), Err(StoreError::Write { .. })));
    }

    #[test]
    fn test_snapshot_revision_grows_with_each_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::new(dir.path().join("auth.yml"));
        let before = store.snapshot();

        store.put(key("bob"), record("pw", "1.1.1.1", 1));
        let after_put = store.snapshot();
        if let Some(bob) = store.get_mut(&key("bob")) {
            bob.touch("2.2.2.2", 2);
        }
        let after_touch = store.snapshot();

        assert!(after_put.revision() > before.revision());
        assert!(after_touch.revision() > after_put.revision());
        assert_eq!(after_touch.text(), store.render());
    }

    #[test]
    fn test_snapshot_written_later_keeps_taken_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.yml");
        let mut store = CredentialStore::new(&path);
        store.put(key("bob"), record("pw", "1.1.1.1", 1));

        let snapshot = store.snapshot();
        store.put(key("amy"), record("pw", "2.2.2.2", 2));
        snapshot.write().unwrap();

        let mut reloaded = CredentialStore::new(&path);
        reloaded.load().unwrap();
        assert!(reloaded.contains(&key("bob")));
        assert!(!reloaded.contains(&key("amy")));
    }

    #[test]
    fn test_open_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("auth.yml"));
        assert!(store.is_empty());
    }
}
