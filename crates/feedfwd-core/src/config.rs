//! Device selection and CPU backend limits

use serde::{Deserialize, Serialize};

use feedfwd_backends::CpuBackendConfig;

/// Available backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Reference backend running kernels on rayon
    #[default]
    Cpu,
    /// NVIDIA GPU through cudarc (requires the `cuda` feature)
    Cuda,
}

impl BackendType {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(Self::Cpu),
            "cuda" | "gpu" => Some(Self::Cuda),
            _ => None,
        }
    }
}

/// Which device to open and how to size the CPU backend
///
/// Every field has a default, so a partial document deserializes:
///
/// ```rust
/// use feedfwd_core::{BackendType, DeviceConfig};
///
/// let config: DeviceConfig = serde_json::from_str(r#"{ "cpu_max_grid_dim_x": 16 }"#).unwrap();
/// assert_eq!(config.backend, BackendType::Cpu);
/// assert_eq!(config.cpu_max_grid_dim_x, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendType,
    /// Device ordinal; the CPU backend only has device 0
    pub device_index: usize,
    /// Byte budget of the CPU backend allocator
    pub cpu_memory_limit_bytes: usize,
    /// Maximum grid extent in x of the CPU backend
    pub cpu_max_grid_dim_x: u32,
    /// Maximum lanes per block of the CPU backend
    pub max_threads_per_block: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let cpu = CpuBackendConfig::default();
        Self {
            backend: BackendType::Cpu,
            device_index: 0,
            cpu_memory_limit_bytes: cpu.memory_limit_bytes,
            cpu_max_grid_dim_x: cpu.max_grid_dim_x,
            max_threads_per_block: cpu.max_threads_per_block,
        }
    }
}

impl DeviceConfig {
    /// Build a configuration from environment variables
    ///
    /// - `FEEDFWD_BACKEND`: `cpu` (default) or `cuda`
    /// - `FEEDFWD_DEVICE`: device ordinal
    /// - `FEEDFWD_CPU_MEMORY_LIMIT`: CPU allocator budget in bytes
    /// - `FEEDFWD_CPU_MAX_GRID_X`: CPU maximum grid extent in x
    /// - `FEEDFWD_MAX_THREADS_PER_BLOCK`: CPU maximum block size
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("FEEDFWD_BACKEND") {
            match BackendType::parse(&value) {
                Some(backend) => config.backend = backend,
                None => tracing::warn!(value = %value, "ignoring unknown FEEDFWD_BACKEND"),
            }
        }
        if let Some(index) = parse_var(&lookup, "FEEDFWD_DEVICE") {
            config.device_index = index;
        }
        if let Some(limit) = parse_var(&lookup, "FEEDFWD_CPU_MEMORY_LIMIT") {
            config.cpu_memory_limit_bytes = limit;
        }
        if let Some(grid) = parse_var(&lookup, "FEEDFWD_CPU_MAX_GRID_X") {
            config.cpu_max_grid_dim_x = grid;
        }
        if let Some(threads) = parse_var(&lookup, "FEEDFWD_MAX_THREADS_PER_BLOCK") {
            config.max_threads_per_block = threads;
        }

        config
    }

    pub(crate) fn cpu_backend_config(&self) -> CpuBackendConfig {
        CpuBackendConfig {
            memory_limit_bytes: self.cpu_memory_limit_bytes,
            max_grid_dim_x: self.cpu_max_grid_dim_x,
            max_threads_per_block: self.max_threads_per_block,
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring unparsable environment value");
            None
        }
    }
}
