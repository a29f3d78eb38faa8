use std::{io, path::PathBuf};

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Directory holding the SQLite database and other local state.
///
/// Debug builds keep everything under `dev_assets/` at the workspace root so
/// a `cargo run` never touches the user's real data directory.
pub fn asset_dir() -> io::Result<PathBuf> {
    let path = if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("dev", "taskforge", "taskforge")
            .ok_or_else(|| io::Error::other("OS didn't give us a home directory"))?
            .data_dir()
            .to_path_buf()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }

    Ok(path)
}

pub fn database_path() -> io::Result<PathBuf> {
    Ok(asset_dir()?.join("db.sqlite"))
}

/// `DATABASE_URL` when set, otherwise the SQLite file inside [`asset_dir`].
pub fn database_url() -> io::Result<String> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => Ok(url),
        _ => Ok(format!("sqlite://{}", database_path()?.to_string_lossy())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_is_inside_asset_dir() {
        let asset = asset_dir().unwrap();
        let db = database_path().unwrap();

        assert_eq!(db, asset.join("db.sqlite"));
        assert!(asset.exists());
    }
}
