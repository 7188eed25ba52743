//! Connection pool configuration

use std::time::Duration;

/// Pool tuning knobs for one logical database URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
	/// Upper bound on concurrently open connections.
	pub max_connections: u32,
	/// Connections kept warm even when idle.
	pub min_connections: u32,
	/// How long a checkout may wait for a free connection.
	pub acquire_timeout: Duration,
	/// Idle connections past this age are reaped.
	pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_connections: 100,
			min_connections: 0,
			acquire_timeout: Duration::from_secs(30),
			idle_timeout: Some(Duration::from_secs(600)),
		}
	}
}

impl PoolConfig {
	pub fn validate(&self) -> Result<(), String> {
		if self.max_connections == 0 {
			return Err("max_connections must be greater than zero".to_string());
		}
		if self.min_connections > self.max_connections {
			return Err(format!(
				"min_connections ({}) exceeds max_connections ({})",
				self.min_connections, self.max_connections
			));
		}
		Ok(())
	}
}
