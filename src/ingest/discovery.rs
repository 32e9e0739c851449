use object_store::path::Path;
use object_store::ObjectMeta;

use crate::error::EtlError;
use crate::storage::StoreHandle;

/// Recursively find every object under `prefix` whose extension is one of
/// `extensions` (case-insensitive).
pub async fn discover_objects(
    handle: &StoreHandle,
    prefix: &Path,
    extensions: &[String],
) -> Result<Vec<ObjectMeta>, EtlError> {
    let objects = handle.list(prefix).await?;

    // `list` already sorts by path, so the result keeps a stable order.
    Ok(objects
        .into_iter()
        .filter(|meta| has_extension(&meta.location, extensions))
        .collect())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext_lower)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsConfig;
    use crate::storage::Location;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_discover_objects() {
        let dir = tempdir().unwrap();

        // Nested date-like partitions, as in the raw log and song trees
        fs::create_dir_all(dir.path().join("log_data/2018/11")).unwrap();
        fs::create_dir_all(dir.path().join("song_data/A/B/C")).unwrap();
        File::create(dir.path().join("log_data/2018/11/2018-11-01-events.json")).unwrap();
        File::create(dir.path().join("log_data/2018/11/2018-11-02-events.JSON")).unwrap();
        File::create(dir.path().join("log_data/2018/11/notes.txt")).unwrap();
        File::create(dir.path().join("song_data/A/B/C/TRABCEI128F424C983.json")).unwrap();

        let location = Location::Local {
            root: dir.path().to_path_buf(),
        };
        let handle = StoreHandle::open(&location, &AwsConfig::default(), false).unwrap();
        let extensions = vec!["json".to_string()];

        let logs = discover_objects(&handle, &handle.path("log_data"), &extensions)
            .await
            .unwrap();
        let names: Vec<_> = logs.iter().map(|m| m.location.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "log_data/2018/11/2018-11-01-events.json",
                "log_data/2018/11/2018-11-02-events.JSON",
            ]
        );

        let songs = discover_objects(&handle, &handle.path("song_data"), &extensions)
            .await
            .unwrap();
        assert_eq!(songs.len(), 1);
    }
}
