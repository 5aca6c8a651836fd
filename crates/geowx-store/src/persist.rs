//! JSON state file holding polygons, data sources and the map viewport

use crate::{MapStore, StoreResult};
use geowx_core::{Coordinate, DataSource, Polygon};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// The persisted subset of the dashboard state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub polygons: Vec<Polygon>,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default = "default_center")]
    pub map_center: Coordinate,
    #[serde(default = "default_zoom")]
    pub map_zoom: f64,
}

fn default_center() -> Coordinate {
    crate::Viewport::default().center
}

fn default_zoom() -> f64 {
    crate::Viewport::default().zoom
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            polygons: Vec::new(),
            data_sources: Vec::new(),
            map_center: default_center(),
            map_zoom: default_zoom(),
        }
    }
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved state; `None` if nothing was saved yet
    pub fn load(&self) -> StoreResult<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Write the state through a temporary sibling file so a crash never
    /// leaves a truncated file behind.
    pub fn save(&self, state: &PersistedState) -> StoreResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

/// Build a store from the state file, starting fresh if there is none or it
/// cannot be read.
pub fn restore(file: &StateFile) -> MapStore {
    match file.load() {
        Ok(Some(saved)) => MapStore::from_persisted(saved),
        Ok(None) => {
            info!(path = %file.path().display(), "no saved state, starting fresh");
            MapStore::default()
        }
        Err(e) => {
            warn!(path = %file.path().display(), error = %e, "unreadable state file, starting fresh");
            MapStore::default()
        }
    }
}

/// Save the store after every configuration change until the store's event
/// channel closes.
pub async fn autosave(store: Arc<MapStore>, file: StateFile) {
    let mut events = store.subscribe();
    loop {
        match events.recv().await {
            Ok(event) if !event.changes_configuration() => continue,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
        if let Err(e) = file.save(&store.persisted().await) {
            warn!(error = %e, "failed to save state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewPolygon;

    fn outline() -> Vec<Coordinate> {
        vec![
            Coordinate::new(1.0, 1.0),
            Coordinate::new(1.0, 2.0),
            Coordinate::new(2.0, 2.0),
        ]
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        assert_eq!(file.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("nested").join("state.json"));

        let store = MapStore::default();
        let polygon = store
            .add_polygon(NewPolygon {
                name: Some("Orchard".into()),
                coordinates: outline(),
                data_source_id: None,
            })
            .await
            .unwrap();
        store.commit_display(&polygon.id, 21.37, "#52c41a").await;
        file.save(&store.persisted().await).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("\"dataSources\""));
        assert!(content.contains("\"mapCenter\""));

        let restored = restore(&file);
        let polygons = restored.polygons().await;
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].name, "Orchard");
        assert_eq!(polygons[0].current_value, Some(21.37));
        assert_eq!(polygons[0].current_color, "#52c41a");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"polygons": []}"#).unwrap();

        let state = StateFile::new(&path).load().unwrap().unwrap();
        assert_eq!(state, PersistedState::default());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let file = StateFile::new(&path);
        assert!(file.load().is_err());
        let store = restore(&file);
        assert!(store.polygons().await.is_empty());
        assert_eq!(store.data_sources().await.len(), 1);
    }

    #[tokio::test]
    async fn test_autosave_on_configuration_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(MapStore::default());

        let task = tokio::spawn(autosave(Arc::clone(&store), StateFile::new(&path)));
        tokio::task::yield_now().await;

        store
            .add_polygon(NewPolygon {
                coordinates: outline(),
                ..NewPolygon::default()
            })
            .await
            .unwrap();

        let mut saved = None;
        for _ in 0..50 {
            if let Ok(Some(state)) = StateFile::new(&path).load() {
                saved = Some(state);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(saved.expect("state file written").polygons.len(), 1);
        task.abort();
    }
}
