//! Append-only CSV persistence for user records.
//!
//! The file is the system of record: it is read once at startup and only
//! ever grows by one row per enrollment. Lines whose first character is
//! `#` are comments; they are skipped by the loader and never rewritten.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::StoreResult;
use crate::user::{RawRecord, User};

pub struct UserFile {
    path: PathBuf,
}

impl UserFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every user record from the file.
    ///
    /// A missing file is treated as an empty database so a fresh install
    /// starts without manual setup. Rows that fail to parse are logged
    /// and skipped; one bad hand-edit must not lock everyone out.
    ///
    /// # Errors
    /// Returns an error only when the file exists but cannot be read.
    pub fn load(&self) -> StoreResult<Vec<User>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "user file missing, starting empty");
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .from_path(&self.path)?;

        let mut users = Vec::new();
        for row in reader.deserialize::<RawRecord>() {
            let record = match row {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unreadable row");
                    continue;
                }
            };
            match User::try_from(record) {
                Ok(user) => users.push(user),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping bad record");
                }
            }
        }
        Ok(users)
    }

    /// Append a single record and flush it to the OS.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or written; the
    /// caller must then leave its in-memory state untouched.
    pub fn append(&self, user: &User) -> StoreResult<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(RawRecord::from(user))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_core::UserLevel;
    use std::io::Write;

    fn user_with_code(name: &str, code: &str) -> User {
        let mut user = User::new(name, UserLevel::User);
        user.set_auth_code(code).unwrap();
        user
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserFile::new(dir.path().join("nonexistent.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = UserFile::new(file.path());

        store.append(&user_with_code("Jon Doe", "doe123")).unwrap();
        store.append(&user_with_code("Jane Doe", "jane123")).unwrap();

        let users = store.load().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Jon Doe");
        assert_eq!(users[1].auth_code(), "jane123");
    }

    #[test]
    fn test_comments_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# Comment").unwrap();
        writeln!(file, "# This is a comment,with,multi,comma,foo,bar,x").unwrap();
        writeln!(file, "root,root@example.net,member,,,,root123").unwrap();
        file.flush().unwrap();

        let store = UserFile::new(file.path());
        let users = store.load().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].auth_code(), "root123");
        assert_eq!(users[0].user_level, UserLevel::Member);
    }

    #[test]
    fn test_hostile_names_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = UserFile::new(file.path());

        let name = "Another,user;[]funny\"characters '";
        store.append(&user_with_code(name, "other123")).unwrap();

        let users = store.load().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, name);
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "root,root@example.net,member,,,,root123").unwrap();
        writeln!(file, "broken,x,overlord,,,,code456").unwrap();
        writeln!(file, "ok,x,user,,,,code789").unwrap();
        file.flush().unwrap();

        let store = UserFile::new(file.path());
        let users = store.load().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "root");
        assert_eq!(users[1].name, "ok");
    }
}
