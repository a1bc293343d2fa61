//! Plugin lifecycle management.
//!
//! A thin specialization of the supervisor's primitives for installable
//! plugins: install/uninstall add a materialization step in front of the
//! same PID-file-based start/stop/health path, keyed by `plugin-<name>`
//! instead of an engine/model pair.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::paths::StatePaths;
use crate::registry::{
    EngineStatus, EngineStatusRegistry, PluginRecord, PluginRegistry, PluginStatus,
};
use crate::supervisor::lifecycle::{
    probe_supervised, start_supervised, stop_supervised, HealthReport, SpawnSpec, StartOutcome,
    StopOutcome,
};
use crate::supervisor::pidfile;

/// Manages installable plugins on top of the supervisor primitives.
pub struct PluginManager {
    paths: StatePaths,
    config: Config,
    plugins: PluginRegistry,
    engines: EngineStatusRegistry,
}

impl PluginManager {
    pub fn new(paths: StatePaths, config: Config) -> Result<Self> {
        paths.ensure_dirs()?;
        let plugins = PluginRegistry::open(&paths.plugins_registry);
        let engines = EngineStatusRegistry::open(&paths.engines_registry);
        Ok(Self {
            paths,
            config,
            plugins,
            engines,
        })
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Materialize a plugin bundle into the managed directory and record it.
    ///
    /// The bundle is opaque: a single file or a directory tree copied as-is.
    /// `permissions` is recorded as metadata only; nothing enforces it.
    pub fn install(
        &self,
        source: &Path,
        name: Option<&str>,
        entry: Option<&str>,
        version: &str,
        permissions: impl IntoIterator<Item = String>,
    ) -> Result<PluginRecord> {
        if !source.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("plugin bundle {} does not exist", source.display()),
            )));
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "plugin".to_string()),
        };
        validate_name(&name)?;

        let dest = self.paths.plugins_dir.join(&name);
        if dest.exists() {
            // Reinstall: stop a still-running worker before its entry
            // point disappears
            stop_supervised(&self.paths, &self.config, &plugin_key(&name))?;
            std::fs::remove_dir_all(&dest)?;
        }
        std::fs::create_dir_all(&dest)?;

        if source.is_dir() {
            copy_tree(source, &dest)?;
        } else {
            let file_name = source.file_name().unwrap_or_default();
            std::fs::copy(source, dest.join(file_name))?;
        }

        let entry_point = self.resolve_entry_point(&dest, &name, entry, source)?;

        let record = PluginRecord {
            name: name.clone(),
            version: version.to_string(),
            permissions: permissions.into_iter().collect(),
            entry_point,
            status: PluginStatus::Installed,
            pid: None,
        };
        self.plugins.register(record.clone())?;

        tracing::info!("Installed plugin '{}' at {}", name, dest.display());
        Ok(record)
    }

    /// Stop the plugin if needed, then delete its directory and record.
    pub fn uninstall(&self, name: &str) -> Result<()> {
        let record = self
            .plugins
            .query(name)?
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;
        validate_name(&record.name)?;

        // Stop first; a plugin that was never started is a no-op here.
        stop_supervised(&self.paths, &self.config, &plugin_key(name))?;

        let dest = self.paths.plugins_dir.join(&record.name);
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        self.plugins.remove(name)?;
        self.engines.remove(&plugin_key(name))?;

        tracing::info!("Uninstalled plugin '{}'", name);
        Ok(())
    }

    /// Start a plugin's worker process.
    pub fn start(&self, name: &str) -> Result<StartOutcome> {
        let record = self
            .plugins
            .query(name)?
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        let identity = record
            .entry_point
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::NoEntryPoint(record.entry_point.display().to_string()))?;

        let key = plugin_key(name);
        let spec = SpawnSpec {
            key: &key,
            engine_type: "plugin",
            model_name: Some(name),
            command: Command::new(&record.entry_point),
            identity: &identity,
        };

        let outcome = start_supervised(&self.paths, &self.config, spec)?;
        self.plugins
            .update_status(name, PluginStatus::Active, Some(outcome.pid()))?;
        self.engines
            .update_status(&key, EngineStatus::Running, Some(outcome.pid()))?;
        Ok(outcome)
    }

    /// Stop a plugin's worker process. Idempotent.
    pub fn stop(&self, name: &str) -> Result<StopOutcome> {
        if self.plugins.query(name)?.is_none() {
            return Err(Error::PluginNotFound(name.to_string()));
        }

        let key = plugin_key(name);
        let outcome = stop_supervised(&self.paths, &self.config, &key)?;
        self.plugins
            .update_status(name, PluginStatus::Inactive, None)?;
        if self.engines.query(&key)?.is_some() {
            self.engines.update_status(&key, EngineStatus::Stopped, None)?;
        }
        Ok(outcome)
    }

    /// Probe a plugin's worker, healing a stale PID file.
    pub fn status(&self, name: &str) -> Result<(PluginRecord, HealthReport)> {
        let record = self
            .plugins
            .query(name)?
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))?;

        let key = plugin_key(name);
        let report = probe_supervised(&self.paths, &key, true)?;
        if report.status == EngineStatus::Crashed {
            self.plugins
                .update_status(name, PluginStatus::Inactive, None)?;
            self.engines.update_status(&key, EngineStatus::Crashed, None)?;
        }
        Ok((record, report))
    }

    pub fn list(&self) -> Result<Vec<PluginRecord>> {
        self.plugins.list()
    }

    fn resolve_entry_point(
        &self,
        dest: &Path,
        name: &str,
        entry: Option<&str>,
        source: &Path,
    ) -> Result<PathBuf> {
        if let Some(entry) = entry {
            let path = dest.join(entry);
            if path.exists() {
                return Ok(path);
            }
            return Err(Error::NoEntryPoint(path.display().to_string()));
        }

        // Convention: a file in the bundle named after the plugin
        let named = dest.join(name);
        if named.is_file() {
            return Ok(named);
        }

        // Single-file bundle: the file itself
        if source.is_file() {
            let path = dest.join(source.file_name().unwrap_or_default());
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(Error::NoEntryPoint(dest.display().to_string()))
    }
}

/// Supervisor instance key for a plugin.
pub fn plugin_key(name: &str) -> String {
    pidfile::instance_key("plugin", Some(name))
}

/// Plugin names become directory names under `plugins/` and filesystem
/// operations (including `remove_dir_all`) run on the joined path, so only
/// a single normal path component is accepted.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPluginName(name.to_string()))
    }
}

fn copy_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
