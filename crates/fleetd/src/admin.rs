//! Operator commands: config check, registry listing and purge.

use std::path::Path;

use anyhow::{Context, bail};
use tracing::info;

use fleet_core::FleetConfig;
use fleet_registry::{RedbRegistry, Registry};

/// Validate `path` and print the resolved config.
pub fn check(path: &Path) -> anyhow::Result<()> {
    let config = FleetConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate().context("invalid configuration")?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Print every record in insertion order as a JSON array.
pub fn list(database: &Path) -> anyhow::Result<()> {
    println!("{}", render_list(&open(database)?)?);
    Ok(())
}

/// Remove a terminal record.
pub fn purge(database: &Path, name: &str) -> anyhow::Result<()> {
    purge_from(&open(database)?, name)?;
    info!(%name, "instance record purged");
    Ok(())
}

fn open(database: &Path) -> anyhow::Result<RedbRegistry> {
    if !database.exists() {
        bail!("registry {} does not exist", database.display());
    }
    RedbRegistry::open(database)
        .with_context(|| format!("opening registry {}", database.display()))
}

fn render_list(registry: &dyn Registry) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&registry.list()?)?)
}

fn purge_from(registry: &dyn Registry, name: &str) -> anyhow::Result<()> {
    let instance = registry.find(name)?;
    if !instance.state.is_terminal() {
        bail!(
            "instance {name} is {}; only stopped or errored records can be purged",
            instance.state
        );
    }
    registry.delete(name)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_registry::{Instance, InstanceState};

    /// Walk each record through the lifecycle up to `state`.
    fn registry_with(states: &[(&str, InstanceState)]) -> RedbRegistry {
        let registry = RedbRegistry::open_in_memory().unwrap();
        for (name, state) in states {
            let mut inst = Instance::new(*name, 2, 100);
            inst.mark_creating(100);
            registry.create(&inst).unwrap();

            if *state == InstanceState::Error {
                inst.mark_error("boom", 101);
                registry.update(&inst).unwrap();
                continue;
            }
            inst.mark_running("10.0.0.1".into(), None, 101);
            registry.update(&inst).unwrap();
            if *state == InstanceState::Stopped {
                inst.mark_stopping(102);
                registry.update(&inst).unwrap();
                inst.mark_stopped(103);
                registry.update(&inst).unwrap();
            }
        }
        registry
    }

    #[test]
    fn purge_removes_terminal_records_only() {
        let registry = registry_with(&[
            ("agent-stopped", InstanceState::Stopped),
            ("agent-error", InstanceState::Error),
            ("agent-running", InstanceState::Running),
        ]);

        purge_from(&registry, "agent-stopped").unwrap();
        purge_from(&registry, "agent-error").unwrap();
        let err = purge_from(&registry, "agent-running").unwrap_err();
        assert!(err.to_string().contains("running"));

        let left: Vec<String> = registry.list().unwrap().into_iter().map(|i| i.name).collect();
        assert_eq!(left, vec!["agent-running"]);
        assert!(purge_from(&registry, "agent-missing").is_err());
    }

    #[test]
    fn list_renders_json_array() {
        let registry = registry_with(&[("agent-a", InstanceState::Running)]);
        let rendered = render_list(&registry).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0]["name"], "agent-a");
        assert_eq!(parsed[0]["state"], "running");
    }

    #[test]
    fn open_refuses_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(&dir.path().join("nope.redb")).is_err());
    }

    #[test]
    fn check_accepts_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "interval = \"1m\"\n[pool]\nmin = 1\nmax = 3\n").unwrap();
        check(&path).unwrap();

        std::fs::write(&path, "[pool]\nmin = 5\nmax = 3\n").unwrap();
        assert!(check(&path).is_err());
    }
}
