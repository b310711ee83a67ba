// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container configuration lines applied before first start

use std::fmt;
use std::str::FromStr;
use tk_core::ResourceLimits;

/// Device cgroup rules for nested virtualization and loop-mounted images.
const DEVICE_ALLOW: &[&str] = &[
    "lxc.cgroup.devices.allow = b 7:* rwm",   // loop devices
    "lxc.cgroup.devices.allow = c 10:237 rwm", // loop-control
    "lxc.cgroup.devices.allow = c 10:232 rwm", // kvm
];

/// A host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub options: Option<String>,
}

impl FromStr for BindMount {
    type Err = String;

    /// `source:target[:options]`, e.g. `/srv/cache:/var/cache/apt:ro`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let source = parts.next().unwrap_or("").trim();
        let target = parts.next().unwrap_or("").trim();
        if source.is_empty() || target.is_empty() {
            return Err(format!(
                "invalid bind mount '{s}' (expected source:target[:options])"
            ));
        }
        let options = parts
            .next()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string);
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            options,
        })
    }
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if let Some(options) = &self.options {
            write!(f, ":{options}")?;
        }
        Ok(())
    }
}

impl BindMount {
    fn config_line(&self) -> String {
        let mut options = "bind,create=dir".to_string();
        if let Some(extra) = &self.options {
            options.push(',');
            options.push_str(extra);
        }
        format!(
            "lxc.mount.entry = {} {} none {} 0 0",
            self.source,
            self.target.trim_start_matches('/'),
            options
        )
    }
}

/// Config lines relaxing isolation and applying resource limits.
pub fn isolation_config(limits: ResourceLimits, mounts: &[BindMount]) -> Vec<String> {
    let mut lines: Vec<String> = DEVICE_ALLOW.iter().map(|l| l.to_string()).collect();
    lines.push("lxc.apparmor.profile = unconfined".to_string());
    lines.push("lxc.autodev = 1".to_string());
    lines.push("lxc.pty.max = 1024".to_string());

    if let Some(cpus) = limits.cpus.filter(|c| *c > 0) {
        lines.push(format!("lxc.cgroup.cpu.shares = {}", u64::from(cpus) * 1024));
    }
    if let Some(mem) = limits.memory_mb.filter(|m| *m > 0) {
        lines.push(format!("lxc.cgroup.memory.limit_in_bytes = {mem}M"));
    }
    lines.extend(mounts.iter().map(BindMount::config_line));
    lines
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
