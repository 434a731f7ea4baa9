use std::path::PathBuf;
use std::sync::OnceLock;

/// Returns the workspace root directory (parent of the crate directory).
fn workspace_root() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir)
        .parent()
        .expect("crate directory should have a parent")
        .to_path_buf()
}

/// Ensures the test output directory exists. Safe to call multiple times.
pub fn ensure_test_output_dir() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        std::fs::create_dir_all(workspace_root().join("test_output"))
            .expect("Failed to create test_output directory");
    });
}

/// Returns the path to a test output file. Any previous file with the same
/// name is removed so exclusive-create callers start clean.
pub fn test_output_path(name: &str) -> PathBuf {
    ensure_test_output_dir();
    let path = workspace_root().join("test_output").join(name);
    let _ = std::fs::remove_file(&path);
    path
}
