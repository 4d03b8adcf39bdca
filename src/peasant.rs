use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::{
    dir::Directory,
    error::{Error, Result},
    transport::{AsyncTransport, Transport},
};

/// Memoization cell for a client's directory. Written at most once.
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    directory: Mutex<Option<Arc<Directory>>>,
}

impl DirectoryCache {
    fn get(&self) -> Option<Arc<Directory>> {
        self.directory.lock().clone()
    }

    /// Stores `directory` unless a value is already cached; returns whatever is cached afterwards.
    fn set(&self, directory: Directory) -> Arc<Directory> {
        let mut cached = self.directory.lock();

        match &*cached {
            Some(existing) => {
                log::trace!("Directory already cached, keeping existing value");
                Arc::clone(existing)
            }
            None => {
                let directory = Arc::new(directory);
                *cached = Some(Arc::clone(&directory));
                directory
            }
        }
    }
}

/// Non-owning link from a transport back to the client that owns it.
///
/// Handed to the transport when the client is constructed. It only reaches the client's directory
/// cache and never keeps the client alive.
#[derive(Debug, Clone)]
pub struct PeasantHandle {
    cache: Weak<DirectoryCache>,
}

impl PeasantHandle {
    fn new(cache: &Arc<DirectoryCache>) -> Self {
        PeasantHandle {
            cache: Arc::downgrade(cache),
        }
    }

    /// True while the owning client is alive.
    pub fn is_attached(&self) -> bool {
        self.cache.strong_count() > 0
    }

    /// The client's cached directory, if populated.
    pub fn directory(&self) -> Option<Arc<Directory>> {
        self.cache.upgrade().and_then(|cache| cache.get())
    }

    /// Populates the client's directory cache.
    ///
    /// The first write wins; later writes leave the cache untouched and return the cached value.
    pub fn set_directory(&self, directory: Directory) -> Result<Arc<Directory>> {
        let cache = self.cache.upgrade().ok_or(Error::Detached)?;
        Ok(cache.set(directory))
    }
}

/// Client over a blocking [`Transport`].
///
/// Lazily discovers the service directory on first use and keeps it for its whole lifetime.
#[derive(Debug)]
pub struct Peasant<T> {
    transport: T,
    cache: Arc<DirectoryCache>,
}

impl<T: Transport> Peasant<T> {
    /// Takes ownership of `transport` and links it back to the new client.
    pub fn new(mut transport: T) -> Self {
        let cache = Arc::new(DirectoryCache::default());
        transport.set_peasant(PeasantHandle::new(&cache));

        Peasant { transport, cache }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The cached directory, without triggering a fetch.
    pub fn directory_cache(&self) -> Option<Arc<Directory>> {
        self.cache.get()
    }

    /// Returns the service directory, asking the transport to fetch it the first time.
    ///
    /// `Ok(None)` means the transport returned without populating the cache.
    pub fn directory(&self) -> Result<Option<Arc<Directory>>> {
        if self.cache.get().is_none() {
            log::debug!("Fetching directory from {}", self.transport.base_address());
            self.transport.set_directory()?;
        }

        Ok(self.cache.get())
    }

    /// Fetches a fresh nonce. Never cached.
    pub fn new_nonce(&self) -> Result<String> {
        self.transport.new_nonce()
    }
}

/// Client over an [`AsyncTransport`].
///
/// Same caching behavior as [`Peasant`]; every operation is a suspension point.
#[derive(Debug)]
pub struct AsyncPeasant<T> {
    transport: T,
    cache: Arc<DirectoryCache>,
}

impl<T: AsyncTransport> AsyncPeasant<T> {
    /// Takes ownership of `transport` and links it back to the new client.
    pub fn new(mut transport: T) -> Self {
        let cache = Arc::new(DirectoryCache::default());
        transport.set_peasant(PeasantHandle::new(&cache));

        AsyncPeasant { transport, cache }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The cached directory, without triggering a fetch.
    pub fn directory_cache(&self) -> Option<Arc<Directory>> {
        self.cache.get()
    }

    /// Returns the service directory, fetching it the first time.
    ///
    /// The cache is only read after the transport's fetch has completed.
    pub async fn directory(&self) -> Result<Option<Arc<Directory>>> {
        if self.cache.get().is_none() {
            log::debug!(
                "Fetching directory from {} asynchronously",
                self.transport.base_address()
            );
            self.transport.set_directory().await?;
        }

        Ok(self.cache.get())
    }

    /// Fetches a fresh nonce. Never cached.
    pub async fn new_nonce(&self) -> Result<String> {
        self.transport.new_nonce().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::transport::TransportBase;

    fn directory() -> Directory {
        serde_json::from_value(json!({ "newNonce": "http://bastion/acme/new-nonce" })).unwrap()
    }

    /// Transport that fills the cache from memory and counts lookups.
    #[derive(Default)]
    struct Counting {
        peasant: Option<PeasantHandle>,
        directory_calls: AtomicUsize,
        nonce_calls: AtomicUsize,
        silent: bool,
    }

    impl TransportBase for Counting {
        fn base_address(&self) -> &str {
            "http://bastion"
        }

        fn peasant(&self) -> Option<&PeasantHandle> {
            self.peasant.as_ref()
        }

        fn set_peasant(&mut self, peasant: PeasantHandle) {
            self.peasant = Some(peasant);
        }
    }

    impl Transport for Counting {
        fn set_directory(&self) -> Result<()> {
            self.directory_calls.fetch_add(1, Ordering::SeqCst);
            if !self.silent {
                self.peasant.as_ref().unwrap().set_directory(directory())?;
            }
            Ok(())
        }

        fn new_nonce(&self) -> Result<String> {
            let n = self.nonce_calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("nonce-{n}"))
        }
    }

    #[test]
    fn test_directory_fetched_once() {
        let peasant = Peasant::new(Counting::default());
        assert!(peasant.directory_cache().is_none());

        let first = peasant.directory().unwrap().unwrap();
        let second = peasant.directory().unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(peasant.transport().directory_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*first, directory());
    }

    #[test]
    fn test_directory_silent_failure() {
        let peasant = Peasant::new(Counting {
            silent: true,
            ..Default::default()
        });

        assert!(peasant.directory().unwrap().is_none());
        assert!(peasant.directory().unwrap().is_none());
        assert_eq!(peasant.transport().directory_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_nonce_not_cached() {
        let peasant = Peasant::new(Counting::default());

        assert_eq!(peasant.new_nonce().unwrap(), "nonce-0");
        assert_eq!(peasant.new_nonce().unwrap(), "nonce-1");
        assert!(peasant.directory_cache().is_none());
    }

    #[test]
    fn test_handle_does_not_own_client() {
        let peasant = Peasant::new(Counting::default());
        let handle = peasant.transport().peasant().unwrap().clone();
        assert!(handle.is_attached());

        drop(peasant);

        assert!(!handle.is_attached());
        assert!(handle.directory().is_none());
        assert!(matches!(
            handle.set_directory(directory()),
            Err(Error::Detached)
        ));
    }

    #[test]
    fn test_first_directory_write_wins() {
        let peasant = Peasant::new(Counting::default());
        let handle = peasant.transport().peasant().unwrap().clone();

        let first = handle.set_directory(directory()).unwrap();
        let second = handle.set_directory(Directory::default()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*peasant.directory_cache().unwrap(), directory());
    }

    /// Async transport whose directory fetch waits until the test releases it.
    struct Gated {
        peasant: Option<PeasantHandle>,
        release: Mutex<Option<oneshot::Receiver<Directory>>>,
        directory_calls: AtomicUsize,
    }

    impl Gated {
        fn new() -> (Self, oneshot::Sender<Directory>) {
            let (tx, rx) = oneshot::channel();
            let transport = Gated {
                peasant: None,
                release: Mutex::new(Some(rx)),
                directory_calls: AtomicUsize::new(0),
            };
            (transport, tx)
        }
    }

    impl TransportBase for Gated {
        fn base_address(&self) -> &str {
            "http://bastion"
        }

        fn peasant(&self) -> Option<&PeasantHandle> {
            self.peasant.as_ref()
        }

        fn set_peasant(&mut self, peasant: PeasantHandle) {
            self.peasant = Some(peasant);
        }
    }

    #[async_trait]
    impl AsyncTransport for Gated {
        async fn set_directory(&self) -> Result<()> {
            self.directory_calls.fetch_add(1, Ordering::SeqCst);

            let release = self.release.lock().take();
            if let Some(release) = release {
                let directory = release.await.expect("gate dropped");
                self.peasant.as_ref().ok_or(Error::Detached)?.set_directory(directory)?;
            }

            Ok(())
        }
    }

    #[tokio::test]
    async fn test_async_directory_waits_for_transport() {
        let (transport, release) = Gated::new();
        let peasant = AsyncPeasant::new(transport);

        let (fetched, ()) = tokio::join!(peasant.directory(), async {
            // the directory future is now parked on the gate
            tokio::task::yield_now().await;
            assert!(peasant.directory_cache().is_none());
            release.send(directory()).unwrap();
        });

        let fetched = fetched.unwrap().unwrap();
        assert_eq!(*fetched, directory());
        assert!(Arc::ptr_eq(&fetched, &peasant.directory_cache().unwrap()));

        let again = peasant.directory().await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&fetched, &again));
        assert_eq!(peasant.transport().directory_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_new_nonce_unimplemented() {
        let (transport, _release) = Gated::new();
        let peasant = AsyncPeasant::new(transport);

        assert!(matches!(
            peasant.new_nonce().await,
            Err(Error::NotImplemented("new_nonce"))
        ));
    }
}
