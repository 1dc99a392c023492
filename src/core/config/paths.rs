use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::from_data_dir(data_dir)
    }

    pub fn from_data_dir(data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        let _ = fs::create_dir_all(&log_dir);

        let config_path = discover_config_path(&data_dir);

        AppPaths {
            data_dir,
            log_dir,
            config_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_config_path(data_dir: &std::path::Path) -> PathBuf {
    if let Ok(path) = env::var("GLOO_RAG_CONFIG") {
        return PathBuf::from(path);
    }

    let user_config = data_dir.join("config.yml");
    if user_config.exists() {
        return user_config;
    }

    env::current_dir()
        .map(|dir| dir.join("config.yml"))
        .unwrap_or(user_config)
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("GLOO_RAG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("GlooRag");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("GlooRag");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("gloo-rag")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_data_dir_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::from_data_dir(dir.path().to_path_buf());
        assert!(paths.log_dir.exists());
        assert_eq!(paths.log_dir, dir.path().join("logs"));
    }
}
