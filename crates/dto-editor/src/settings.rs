//! Editor settings and preferences.
//!
//! Settings are reached through the [`SettingsStore`] capability: a flat
//! key-value store with `/`-separated keys such as `window/geometry`. The
//! store is injected, so the editor never depends on where values are kept.
//! [`MemorySettings`] is the in-process implementation; hosts that persist
//! settings provide their own.
//!
//! [`EditorSettings`] is the typed view the editor uses: window geometry,
//! editor font, the current project directory and the recent-projects list.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dto_editor::settings::{EditorSettings, MemorySettings, SettingsStore, SettingsStoreExt};
//!
//! let store = Arc::new(MemorySettings::new());
//! store.set_value("view/show_types", true.into());
//! assert_eq!(store.get::<bool>("view/show_types"), Some(true));
//!
//! let settings = EditorSettings::new(store);
//! settings.add_recent_project("/work/a");
//! settings.add_recent_project("/work/b");
//! assert_eq!(settings.recent_projects()[0].to_str(), Some("/work/b"));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dto_editor_core::Signal;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Maximum number of entries kept in the recent-projects list.
pub const MAX_RECENT_PROJECTS: usize = 10;

/// Keys used by [`EditorSettings`].
pub mod keys {
    /// Main window position and size.
    pub const WINDOW_GEOMETRY: &str = "window/geometry";
    /// Editor font.
    pub const EDITOR_FONT: &str = "editor/font";
    /// Most-recent-first list of project paths.
    pub const RECENT_PROJECTS: &str = "project/recent";
    /// Directory of the project currently open.
    pub const CURRENT_PROJECT_DIR: &str = "project/current_dir";
}

/// Errors raised while converting settings values.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A value could not be converted into a settings value.
    #[error("failed to serialize setting '{key}': {source}")]
    Serialize {
        /// The key being written.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// A stored value does not have the requested shape.
    #[error("failed to deserialize setting '{key}': {source}")]
    Deserialize {
        /// The key being read.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// A value that can be stored in settings.
///
/// Structured values go through serde; see [`SettingsStoreExt`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    /// A null/empty value.
    #[default]
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A string value.
    String(String),
    /// An array of values.
    Array(Vec<SettingsValue>),
    /// A nested object.
    Object(HashMap<String, SettingsValue>),
}

impl SettingsValue {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SettingsValue::Null)
    }

    /// Returns this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingsValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SettingsValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns this value as a float, if it is one.
    /// Also converts integers to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            SettingsValue::Float(v) => Some(*v),
            SettingsValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingsValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[SettingsValue]> {
        match self {
            SettingsValue::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Returns this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&HashMap<String, SettingsValue>> {
        match self {
            SettingsValue::Object(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for SettingsValue {
    fn from(v: bool) -> Self {
        SettingsValue::Bool(v)
    }
}

impl From<i32> for SettingsValue {
    fn from(v: i32) -> Self {
        SettingsValue::Integer(v as i64)
    }
}

impl From<i64> for SettingsValue {
    fn from(v: i64) -> Self {
        SettingsValue::Integer(v)
    }
}

impl From<f64> for SettingsValue {
    fn from(v: f64) -> Self {
        SettingsValue::Float(v)
    }
}

impl From<String> for SettingsValue {
    fn from(v: String) -> Self {
        SettingsValue::String(v)
    }
}

impl From<&str> for SettingsValue {
    fn from(v: &str) -> Self {
        SettingsValue::String(v.to_string())
    }
}

impl<T: Into<SettingsValue>> From<Vec<T>> for SettingsValue {
    fn from(v: Vec<T>) -> Self {
        SettingsValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Conversion from a stored value into a Rust type.
pub trait FromSettingsValue: Sized {
    /// Convert, or `None` if the value has a different shape.
    fn from_settings_value(value: &SettingsValue) -> Option<Self>;
}

impl FromSettingsValue for bool {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSettingsValue for i32 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_integer().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSettingsValue for i64 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_integer()
    }
}

impl FromSettingsValue for f64 {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_float()
    }
}

impl FromSettingsValue for String {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl<T: FromSettingsValue> FromSettingsValue for Vec<T> {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(T::from_settings_value)
            .collect()
    }
}

impl FromSettingsValue for SettingsValue {
    fn from_settings_value(value: &SettingsValue) -> Option<Self> {
        Some(value.clone())
    }
}

/// Key-value settings capability.
pub trait SettingsStore: Send + Sync {
    /// The value stored under `key`.
    fn value(&self, key: &str) -> Option<SettingsValue>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_value(&self, key: &str, value: SettingsValue);

    /// Remove the value under `key`, returning it.
    fn remove(&self, key: &str) -> Option<SettingsValue>;

    /// Whether a value is stored under `key`.
    fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    /// All stored keys, in no particular order.
    fn keys(&self) -> Vec<String>;
}

/// Typed and serde-based access on top of any [`SettingsStore`].
pub trait SettingsStoreExt: SettingsStore {
    /// Read `key` as `T`; `None` if missing or of another type.
    fn get<T: FromSettingsValue>(&self, key: &str) -> Option<T> {
        T::from_settings_value(&self.value(key)?)
    }

    /// Read `key` as `T`, falling back to `default`.
    fn get_or<T: FromSettingsValue>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Store any serializable value under `key`.
    fn set_serialized<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SettingsError> {
        let stored = serde_json::to_value(value)
            .and_then(serde_json::from_value::<SettingsValue>)
            .map_err(|source| SettingsError::Serialize {
                key: key.to_string(),
                source,
            })?;
        self.set_value(key, stored);
        Ok(())
    }

    /// Read a structured value stored with [`set_serialized`](Self::set_serialized).
    ///
    /// Returns `Ok(None)` if the key is missing.
    fn get_deserialized<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        let Some(stored) = self.value(key) else {
            return Ok(None);
        };
        serde_json::to_value(stored)
            .and_then(serde_json::from_value)
            .map(Some)
            .map_err(|source| SettingsError::Deserialize {
                key: key.to_string(),
                source,
            })
    }
}

impl<S: SettingsStore + ?Sized> SettingsStoreExt for S {}

/// A thread-safe in-memory [`SettingsStore`].
pub struct MemorySettings {
    data: RwLock<HashMap<String, SettingsValue>>,
    changed: Signal<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettings {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            changed: Signal::new(),
        }
    }

    /// Signal emitted with the key whenever a value is set or removed.
    pub fn changed(&self) -> &Signal<String> {
        &self.changed
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl SettingsStore for MemorySettings {
    fn value(&self, key: &str) -> Option<SettingsValue> {
        self.data.read().get(key).cloned()
    }

    fn set_value(&self, key: &str, value: SettingsValue) {
        self.data.write().insert(key.to_string(), value);
        tracing::trace!(target: "dto_editor::settings", key, "setting changed");
        self.changed.emit(key.to_string());
    }

    fn remove(&self, key: &str) -> Option<SettingsValue> {
        let removed = self.data.write().remove(key);
        if removed.is_some() {
            self.changed.emit(key.to_string());
        }
        removed
    }

    fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for MemorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySettings")
            .field("len", &self.len())
            .finish()
    }
}

/// Position and size of the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    /// Left edge in screen coordinates.
    pub x: i32,
    /// Top edge in screen coordinates.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Font used by the value editor views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSettings {
    /// Font family name.
    pub family: String,
    /// Size in points.
    pub point_size: f64,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: "Monospace".to_string(),
            point_size: 10.0,
        }
    }
}

/// Typed editor settings over an injected [`SettingsStore`].
///
/// Clones share the store. Edits to the recent-projects list are serialized
/// across clones, so concurrent adds and removes never lose an entry.
#[derive(Clone)]
pub struct EditorSettings {
    store: Arc<dyn SettingsStore>,
    recent_lock: Arc<Mutex<()>>,
}

impl EditorSettings {
    /// Wrap `store`.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            recent_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// Saved window geometry. A malformed entry is logged and ignored.
    pub fn window_geometry(&self) -> Option<WindowGeometry> {
        self.read_or_warn(keys::WINDOW_GEOMETRY)
    }

    /// Save the window geometry.
    pub fn set_window_geometry(&self, geometry: &WindowGeometry) -> Result<(), SettingsError> {
        self.store.set_serialized(keys::WINDOW_GEOMETRY, geometry)
    }

    /// Editor font, or the default font if none is saved.
    pub fn font(&self) -> FontSettings {
        self.read_or_warn(keys::EDITOR_FONT).unwrap_or_default()
    }

    /// Save the editor font.
    pub fn set_font(&self, font: &FontSettings) -> Result<(), SettingsError> {
        self.store.set_serialized(keys::EDITOR_FONT, font)
    }

    /// Directory of the project currently open.
    pub fn current_project_dir(&self) -> Option<PathBuf> {
        self.store
            .get::<String>(keys::CURRENT_PROJECT_DIR)
            .map(PathBuf::from)
    }

    /// Record `dir` as the open project's directory.
    pub fn set_current_project_dir(&self, dir: impl AsRef<Path>) {
        self.store.set_value(
            keys::CURRENT_PROJECT_DIR,
            dir.as_ref().to_string_lossy().into_owned().into(),
        );
    }

    /// Recently opened projects, most recent first.
    pub fn recent_projects(&self) -> Vec<PathBuf> {
        self.store
            .get::<Vec<String>>(keys::RECENT_PROJECTS)
            .unwrap_or_default()
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    /// Move `path` to the front of the recent-projects list.
    ///
    /// An existing entry for the same path is replaced, and the list is
    /// truncated to [`MAX_RECENT_PROJECTS`].
    pub fn add_recent_project(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let _guard = self.recent_lock.lock();
        let mut projects = self.recent_projects();
        projects.retain(|p| p != &path);
        projects.insert(0, path);
        projects.truncate(MAX_RECENT_PROJECTS);
        self.write_recent(&projects);
    }

    /// Drop `path` from the list. Returns true if it was present.
    pub fn remove_recent_project(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let _guard = self.recent_lock.lock();
        let mut projects = self.recent_projects();
        let before = projects.len();
        projects.retain(|p| p != path);
        if projects.len() == before {
            return false;
        }
        self.write_recent(&projects);
        true
    }

    /// Forget all recent projects.
    pub fn clear_recent_projects(&self) {
        let _guard = self.recent_lock.lock();
        self.store.remove(keys::RECENT_PROJECTS);
    }

    fn write_recent(&self, projects: &[PathBuf]) {
        let entries: Vec<String> = projects
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        self.store.set_value(keys::RECENT_PROJECTS, entries.into());
    }

    fn read_or_warn<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get_deserialized(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(target: "dto_editor::settings", error = %err, "ignoring malformed setting");
                None
            }
        }
    }
}

impl std::fmt::Debug for EditorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSettings").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn editor_settings() -> (Arc<MemorySettings>, EditorSettings) {
        let store = Arc::new(MemorySettings::new());
        let settings = EditorSettings::new(store.clone());
        (store, settings)
    }

    #[test]
    fn test_basic_get_set() {
        let settings = MemorySettings::new();

        settings.set_value("name", "test".into());
        settings.set_value("count", 42.into());
        settings.set_value("ratio", 2.5.into());
        settings.set_value("enabled", true.into());

        assert_eq!(settings.get::<String>("name"), Some("test".to_string()));
        assert_eq!(settings.get::<i32>("count"), Some(42));
        assert_eq!(settings.get::<f64>("ratio"), Some(2.5));
        assert_eq!(settings.get::<bool>("enabled"), Some(true));
        assert_eq!(settings.get::<bool>("name"), None);
        assert_eq!(settings.get_or("missing", 7), 7);
    }

    #[test]
    fn test_contains_and_remove() {
        let settings = MemorySettings::new();

        settings.set_value("key", "value".into());
        assert!(settings.contains("key"));

        let removed = settings.remove("key");
        assert_eq!(removed, Some(SettingsValue::String("value".to_string())));
        assert!(!settings.contains("key"));
        assert!(settings.is_empty());
    }

    #[test]
    fn test_change_signal() {
        let settings = MemorySettings::new();
        let change_count = Arc::new(AtomicUsize::new(0));
        let count_clone = change_count.clone();

        settings.changed().connect(move |_key| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        settings.set_value("a", 1.into());
        settings.set_value("b", 2.into());
        settings.remove("a");
        // Removing a missing key does not notify
        settings.remove("zzz");

        assert_eq!(change_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_serialized_types() {
        let (store, settings) = editor_settings();
        let geometry = WindowGeometry {
            x: 10,
            y: -20,
            width: 1280,
            height: 800,
        };

        assert_eq!(settings.window_geometry(), None);
        settings.set_window_geometry(&geometry).unwrap();
        assert_eq!(settings.window_geometry(), Some(geometry));
        assert!(store.value(keys::WINDOW_GEOMETRY).unwrap().as_object().is_some());
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let (store, settings) = editor_settings();
        store.set_value(keys::EDITOR_FONT, "not a font".into());

        assert!(matches!(
            store.get_deserialized::<FontSettings>(keys::EDITOR_FONT),
            Err(SettingsError::Deserialize { .. })
        ));
        assert_eq!(settings.font(), FontSettings::default());
    }

    #[test]
    fn test_recent_projects_most_recent_first() {
        let (_store, settings) = editor_settings();

        settings.add_recent_project("/p/one");
        settings.add_recent_project("/p/two");
        settings.add_recent_project("/p/one");

        assert_eq!(
            settings.recent_projects(),
            vec![PathBuf::from("/p/one"), PathBuf::from("/p/two")]
        );
    }

    #[test]
    fn test_recent_projects_capped() {
        let (_store, settings) = editor_settings();

        for i in 0..MAX_RECENT_PROJECTS + 3 {
            settings.add_recent_project(format!("/p/{i}"));
        }

        let projects = settings.recent_projects();
        assert_eq!(projects.len(), MAX_RECENT_PROJECTS);
        assert_eq!(projects[0], PathBuf::from(format!("/p/{}", MAX_RECENT_PROJECTS + 2)));
        assert!(!projects.contains(&PathBuf::from("/p/0")));
    }

    #[test]
    fn test_remove_and_clear_recent_projects() {
        let (store, settings) = editor_settings();

        settings.add_recent_project("/p/a");
        settings.add_recent_project("/p/b");
        assert!(settings.remove_recent_project("/p/a"));
        assert!(!settings.remove_recent_project("/p/a"));
        assert_eq!(settings.recent_projects(), vec![PathBuf::from("/p/b")]);

        settings.clear_recent_projects();
        assert!(settings.recent_projects().is_empty());
        assert!(!store.contains(keys::RECENT_PROJECTS));
    }

    #[test]
    fn test_concurrent_recent_project_adds_from_clones() {
        let (_store, settings) = editor_settings();
        let threads = 8;
        assert!(threads <= MAX_RECENT_PROJECTS);

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let settings = settings.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        settings.add_recent_project(format!("/p/{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let projects = settings.recent_projects();
        assert_eq!(projects.len(), threads);
        for i in 0..threads {
            assert!(projects.contains(&PathBuf::from(format!("/p/{i}"))));
        }
    }

    #[test]
    fn test_current_project_dir() {
        let (_store, settings) = editor_settings();
        assert_eq!(settings.current_project_dir(), None);

        settings.set_current_project_dir("/work/project");
        assert_eq!(
            settings.current_project_dir(),
            Some(PathBuf::from("/work/project"))
        );
    }
}
