use std::path::PathBuf;

/// Resolves the user's home directory from the environment.
pub fn user_home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        if let Ok(profile) = std::env::var("USERPROFILE") {
            return Some(PathBuf::from(profile));
        }

        // Fallback (older / edge cases)
        let drive = std::env::var("HOMEDRIVE").ok();
        let path = std::env::var("HOMEPATH").ok();
        if let (Some(d), Some(p)) = (drive, path) {
            return Some(PathBuf::from(format!("{}{}", d, p)));
        }

        None
    }

    #[cfg(not(windows))]
    {
        std::env::var("HOME").map(PathBuf::from).ok()
    }
}

/// Config and log files live in `~/.wallpaper-rotator/`, falling back to the
/// executable's directory when no home directory can be resolved.
pub fn app_root_dir() -> PathBuf {
    if let Some(home) = user_home_dir() {
        let root = home.join(".wallpaper-rotator");
        let _ = std::fs::create_dir_all(&root);
        return root;
    }

    match std::env::current_exe() {
        Ok(path) => path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
        Err(_) => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn config_path() -> PathBuf {
    app_root_dir().join("wallpaper_rotator_config.json")
}
