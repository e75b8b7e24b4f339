//! Platform-specific backend paths.
//!
//! Locates the Python interpreter for the backend. A project-local virtual
//! environment wins over whatever `python` is on the PATH.

use std::path::{Path, PathBuf};

/// Interpreter name used when no virtual environment exists.
pub const FALLBACK_PYTHON: &str = "python";

/// Name of the virtual environment directory inside the backend directory.
pub const VENV_DIR: &str = "venv";

/// Interpreter path inside a Windows-layout virtual environment.
#[must_use]
pub fn windows_venv_python(backend_dir: &Path) -> PathBuf {
    backend_dir
        .join(VENV_DIR)
        .join("Scripts")
        .join("python.exe")
}

/// Interpreter path inside a POSIX-layout virtual environment.
#[must_use]
pub fn posix_venv_python(backend_dir: &Path) -> PathBuf {
    backend_dir.join(VENV_DIR).join("bin").join("python")
}

/// Resolves the interpreter for `backend_dir`.
///
/// Order: Windows venv layout, POSIX venv layout, bare `python`. Only
/// existence is checked.
#[must_use]
pub fn resolve_python(backend_dir: &Path) -> PathBuf {
    [windows_venv_python(backend_dir), posix_venv_python(backend_dir)]
        .into_iter()
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_PYTHON))
}

/// Default backend directory: `backend/` next to the executable.
#[must_use]
pub fn default_backend_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("backend")))
        .unwrap_or_else(|| PathBuf::from("backend"))
}
