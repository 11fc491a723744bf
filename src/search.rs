use std::collections::HashMap;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::{env, fs, io};

use tracing::debug;

const PATH_KEY: &str = "PATH";

/// Program name to absolute path, built from `$PATH`. The first directory
/// listing a name wins, as with an ordinary PATH walk.
pub struct SearchCache {
	imp: HashMap<OsString, CString>,
}

impl SearchCache {
	pub fn new() -> SearchCache {
		let mut this = SearchCache { imp: HashMap::new() };
		this.rehash();
		this
	}

	fn add_entry(&mut self, entry: io::Result<fs::DirEntry>) -> io::Result<()> {
		let e = entry?;
		let meta = fs::metadata(e.path())?;
		if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
			return Ok(());
		}
		let path = CString::new(e.path().as_os_str().as_bytes())?;
		self.imp.entry(e.file_name()).or_insert(path);
		Ok(())
	}

	pub fn rehash(&mut self) {
		self.imp.clear();
		let path_var = env::var_os(PATH_KEY).unwrap_or_default();
		for dir in env::split_paths(&path_var) {
			if let Ok(entries) = fs::read_dir(dir) {
				for entry in entries {
					let _ = self.add_entry(entry);
				}
			}
		}
		debug!(programs = self.imp.len(), "rehashed search cache");
	}

	/// Resolves a program name. Names containing `/` are paths already and
	/// are returned unchanged without consulting the cache.
	pub fn lookup(&self, name: &str) -> Option<CString> {
		if name.contains('/') {
			return CString::new(name).ok();
		}
		self.imp.get(OsStr::new(name)).cloned()
	}
}

impl Default for SearchCache {
	fn default() -> SearchCache {
		SearchCache::new()
	}
}
