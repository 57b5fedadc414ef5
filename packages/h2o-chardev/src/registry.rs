// devices and the registry that owns them.

use crate::file::{AccessMode, File};
use anyhow::{bail, Result};
use dashmap::{mapref::entry::Entry, DashMap};
use h2o::{EngineConfig, Snapshot};
use std::sync::{
    atomic::{AtomicU64, Ordering::Relaxed},
    Arc,
};


/// Configuration for registering a [`Device`]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceConfig {
    /// Major number the device is registered under
    pub major: u32,
    /// Name the device is registered under
    pub name: String,
    /// Engine buffer capacity in bytes
    pub capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig { major: 60, name: "h2o".into(), capacity: h2o::DEFAULT_CAPACITY }
    }
}

impl DeviceConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Ownership-chaining setter for [`major`](Self::major)
    pub fn with_major(mut self, major: u32) -> Self {
        self.major = major;
        self
    }

    /// Ownership-chaining setter for [`name`](Self::name)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Ownership-chaining setter for [`capacity`](Self::capacity)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}


/// Registered devices, keyed by major number
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<u32, Arc<Device>>,
}

impl DeviceRegistry {
    /// Construct empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with a fresh engine
    ///
    /// Errors if the major number is taken or the configuration is invalid.
    pub fn register(&self, config: DeviceConfig) -> Result<Arc<Device>> {
        let engine = EngineConfig::new().with_capacity(config.capacity).build()?;
        match self.devices.entry(config.major) {
            Entry::Occupied(_) => {
                warn!(major = config.major, name = %config.name, "major number taken");
                bail!("cannot obtain major number {}", config.major);
            }
            Entry::Vacant(entry) => {
                let device = Arc::new(Device {
                    major: config.major,
                    name: config.name,
                    engine,
                    next_file_id: AtomicU64::new(0),
                    open_files: DashMap::new(),
                });
                info!(major = device.major, name = %device.name, "inserting device");
                entry.insert(Arc::clone(&device));
                Ok(device)
            }
        }
    }

    /// Remove the device registered under `major`, if any
    ///
    /// The device's engine is dropped once every handle to the device is.
    pub fn unregister(&self, major: u32) -> Option<Arc<Device>> {
        let (_, device) = self.devices.remove(&major)?;
        info!(major, name = %device.name, "removing device");
        Some(device)
    }

    /// Device registered under `major`, if any
    pub fn get(&self, major: u32) -> Option<Arc<Device>> {
        self.devices.get(&major).map(|device| Arc::clone(&device))
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are registered
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}


/// A registered device, owning one engine
#[derive(Debug)]
pub struct Device {
    major: u32,
    name: String,
    engine: h2o::Engine,
    next_file_id: AtomicU64,
    // currently open files
    open_files: DashMap<u64, AccessMode>,
}

impl Device {
    /// Major number
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the engine's counters
    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    /// Number of files currently open on this device
    pub fn open_files(&self) -> usize {
        self.open_files.len()
    }

    /// Open a file on this device. Has no effect on the engine.
    pub fn open(self: &Arc<Self>, mode: AccessMode) -> File {
        let id = self.next_file_id.fetch_add(1, Relaxed);
        self.open_files.insert(id, mode);
        info!(device = %self.name, file = id, %mode, "open");
        File::new(Arc::clone(self), id, mode)
    }

    pub(crate) fn engine(&self) -> &h2o::Engine {
        &self.engine
    }

    // called when a file is dropped
    pub(crate) fn release(&self, id: u64) {
        self.open_files.remove(&id);
        info!(device = %self.name, file = id, "release");
    }
}
