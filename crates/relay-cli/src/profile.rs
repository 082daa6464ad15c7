use std::path::{Path, PathBuf};

/// Environment variable naming the active profile.
pub const PROFILE_VAR: &str = "RELAY_ENV";
pub const DEFAULT_PROFILE: &str = "prod";

/// `<dir>/.env.<profile>`, or `None` for names that could escape `dir`.
pub fn profile_path(dir: &Path, profile: &str) -> Option<PathBuf> {
    let valid = !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| dir.join(format!(".env.{profile}")))
}

/// Load `.env.<profile>` from `dir` if it exists.
///
/// Variables already present in the process environment win over the file.
/// Returns the path that was loaded.
pub fn load_profile(dir: &Path, profile: &str) -> anyhow::Result<Option<PathBuf>> {
    let Some(path) = profile_path(dir, profile) else {
        anyhow::bail!("invalid {PROFILE_VAR} profile name '{profile}'");
    };
    if !path.is_file() {
        return Ok(None);
    }
    dotenvy::from_path(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?;
    Ok(Some(path))
}
