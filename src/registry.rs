//! One open transport per connection key

use std::{ collections::HashMap, future::Future, sync::Arc };
use log::{ debug, info };
use tokio::sync::{ Mutex, OnceCell };
use crate::error::Result;

/// A transport shared by everyone who talks to the same device
pub type Shared<T> = Arc<Mutex<T>>;

/// Deduplicates connections by key, e.g. `"10.0.0.4:5025"` or `"root@10.0.0.7"`
///
/// Every caller asking for the same key gets a clone of the same handle, so two drivers for one
/// box never open two sockets to it and their commands are serialized by the handle's mutex.
pub struct Registry<T>
{
    /// The map lock is only held for lookups; each key is opened under its own cell
    handles: Mutex<HashMap<String, Arc<OnceCell<Shared<T>>>>>,
}

impl <T> Default for Registry<T>
{
    fn default() -> Self
    {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }
}

impl <T> Registry<T>
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Returns the handle for `key`, calling `open` to create it on first use
    ///
    /// Concurrent first requests for one key open it only once, while other keys open
    /// independently. A failed open is not remembered.
    pub async fn get_or_open<F, Fut>(&self, key: &str, open: F) -> Result<Shared<T>>
        where F: FnOnce() -> Fut,
              Fut: Future<Output = Result<T>>
    {
        let cell = self.handles.lock().await.entry(key.to_string()).or_default().clone();

        if let Some(handle) = cell.get() {
            debug!("Reusing connection {}", key);
            return Ok(handle.clone());
        }

        let handle = cell
            .get_or_try_init(|| async move {
                let handle = Arc::new(Mutex::new(open().await?));
                info!("Opened connection {}", key);
                Ok::<_, crate::error::Error>(handle)
            })
            .await?;

        Ok(handle.clone())
    }

    pub async fn get(&self, key: &str) -> Option<Shared<T>>
    {
        self.handles.lock().await.get(key)?.get().cloned()
    }

    /// Forgets the handle for `key`
    ///
    /// The connection closes once the last clone of the handle is dropped.
    pub async fn close(&self, key: &str) -> bool
    {
        self.handles
            .lock()
            .await
            .remove(key)
            .map_or(false, |cell| cell.initialized())
    }

    /// Number of open handles
    pub async fn len(&self) -> usize
    {
        self.handles
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}
