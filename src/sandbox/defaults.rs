/// Platform deny-list: locations no action may touch, whatever the
/// allow-list says. Configuration can add entries but not remove these.
use std::path::PathBuf;

/// Directory names that are protected wherever they appear
/// (compared case-insensitively).
pub const DENIED_COMPONENTS: &[&str] = &["$Recycle.Bin", "System Volume Information", ".Trash"];

#[cfg(windows)]
pub fn default_denied_paths() -> Vec<PathBuf> {
    let env_or = |var: &str, fallback: &str| {
        std::env::var_os(var)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(fallback))
    };

    let system_drive = env_or("SystemDrive", "C:");
    let mut paths = vec![
        env_or("SystemRoot", r"C:\Windows"),
        env_or("ProgramFiles", r"C:\Program Files"),
        env_or("ProgramFiles(x86)", r"C:\Program Files (x86)"),
        env_or("ProgramData", r"C:\ProgramData"),
        system_drive.join(r"\$Recycle.Bin"),
        system_drive.join(r"\Recovery"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join("AppData"));
        paths.push(home.join("NTUSER.DAT"));
    }
    paths
}

#[cfg(not(windows))]
pub fn default_denied_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = [
        "/etc", "/bin", "/sbin", "/usr", "/lib", "/lib64", "/boot", "/proc", "/sys", "/dev",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    if let Some(home) = dirs::home_dir() {
        for metadata in [".ssh", ".gnupg", ".config", ".local/share/Trash", ".Trash", "Library"] {
            paths.push(home.join(metadata));
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_absolute() {
        let paths = default_denied_paths();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.is_absolute()), "{paths:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_defaults_cover_system_directories() {
        let paths = default_denied_paths();
        assert!(paths.contains(&PathBuf::from("/etc")));
        assert!(paths.contains(&PathBuf::from("/usr")));
    }
}
