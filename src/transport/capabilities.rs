use crate::sender::BeaconChannel;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared online/offline flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity(Arc<AtomicBool>);

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What the host environment can do, decided once at construction.
#[derive(Clone)]
pub struct Capabilities {
    pub beacon: Option<Arc<dyn BeaconChannel>>,
    pub stream_compression: bool,
    pub persistent_storage: bool,
    pub connectivity: Connectivity,
}

impl Capabilities {
    pub fn with_beacon(mut self, beacon: Arc<dyn BeaconChannel>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.stream_compression = false;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            beacon: None,
            stream_compression: true,
            persistent_storage: cfg!(feature = "disk-fallback"),
            connectivity: Connectivity::default(),
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("beacon", &self.beacon.is_some())
            .field("stream_compression", &self.stream_compression)
            .field("persistent_storage", &self.persistent_storage)
            .field("online", &self.connectivity.is_online())
            .finish()
    }
}
