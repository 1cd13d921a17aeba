//! Scripted stand-in for the Datalog interpreter
//!
//! The script honours the interpreter's command-line contract: the source
//! file comes first, then `--include-dir=`, `--output-dir=`, `--fact-dir=` and
//! `--library-dir=`. Test bodies see them as `$src`, `$inc`, `$out`, `$facts`
//! and `$lib`.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Serialize script creation and execution across test threads
///
/// A freshly written script can fail to exec with ETXTBSY while another
/// thread forks with its write handle still open.
pub fn spawn_guard() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write an executable fake interpreter running `body` into `dir`
pub fn fake_interpreter(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-souffle");
    let script = format!(
        r#"#!/bin/sh
src="$1"
shift
for arg in "$@"; do
  case "$arg" in
    --include-dir=*) inc="${{arg#--include-dir=}}" ;;
    --output-dir=*) out="${{arg#--output-dir=}}" ;;
    --fact-dir=*) facts="${{arg#--fact-dir=}}" ;;
    --library-dir=*) lib="${{arg#--library-dir=}}" ;;
  esac
done
{}
"#,
        body
    );
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// An empty file standing in for the analysis database
pub fn empty_database(dir: &Path) -> PathBuf {
    let path = dir.join("macaron.db");
    fs::write(&path, b"").unwrap();
    path
}
