// (c) 2025 peerlink developers

//! Unique destination-name generation
//!
//! Mints names of the form `{prefix}{counter}{suffix}` for received files
//! when the caller doesn't supply one. The counter is a decimal ASCII string
//! persisted in a hidden `.counter.conf` file under the generator's root, so
//! names remain unique across restarts. The counter is arbitrary-precision:
//! incrementing is a digit-carry walk over the string, never a parse.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

const COUNTER_FILE: &str = ".counter.conf";

/// Persistent unique-name source. See the [module docs](self).
#[derive(Debug)]
pub struct UniqueNameGenerator {
    root: PathBuf,
    prefix: String,
    suffix: String,
    lock: Mutex<()>,
}

impl UniqueNameGenerator {
    /// Creates a generator rooted at `root` (created if absent).
    ///
    /// # Errors
    /// Filesystem failures creating the root directory.
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            prefix: prefix.into(),
            suffix: suffix.into(),
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the next unique name and persists the advanced counter.
    ///
    /// # Errors
    /// Filesystem failures reading or writing the counter file.
    pub fn next_name(&self) -> io::Result<String> {
        let _guard = self.lock.lock();
        let counter_path = self.root.join(COUNTER_FILE);
        let current = match fs::read_to_string(&counter_path) {
            Ok(s) if s.trim().chars().all(|c| c.is_ascii_digit()) && !s.trim().is_empty() => {
                s.trim().to_string()
            }
            Ok(_) => "0".to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => "0".to_string(),
            Err(e) => return Err(e),
        };
        let name = format!("{}{}{}", self.prefix, current, self.suffix);
        fs::write(&counter_path, increment_decimal(&current))?;
        Ok(name)
    }
}

/// Adds one to a decimal ASCII string of any length.
fn increment_decimal(value: &str) -> String {
    let mut digits: Vec<u8> = value.bytes().collect();
    for digit in digits.iter_mut().rev() {
        if *digit < b'9' {
            *digit += 1;
            return String::from_utf8(digits).expect("ascii digits");
        }
        *digit = b'0';
    }
    digits.insert(0, b'1');
    String::from_utf8(digits).expect("ascii digits")
}
