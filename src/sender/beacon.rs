use url::Url;

#[cfg(test)]
use mockall::automock;

/// Fire-and-forget delivery channel provided by the host environment.
///
/// A beacon cannot carry custom headers and reports only whether the host
/// accepted the payload for sending, not whether the collector received it.
#[cfg_attr(test, automock)]
pub trait BeaconChannel: Send + Sync {
    fn send(&self, url: &Url, body: &[u8], content_type: &str) -> bool;
}
