use super::{check_key, CoverStore};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory store with call counters and injectable put failures.
#[derive(Clone)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    put_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
    failing_puts: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            put_count: Arc::new(Mutex::new(0)),
            delete_count: Arc::new(Mutex::new(0)),
            failing_puts: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_file(self, key: String, content: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(key, content);
        self
    }

    /// Fail the next `count` puts with a storage error.
    pub fn with_failing_puts(self, count: usize) -> Self {
        *self.failing_puts.lock().unwrap() = count;
        self
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    pub fn get_file(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(key).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoverStore for MemoryStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        check_key(key)?;
        *self.put_count.lock().unwrap() += 1;

        {
            let mut failing = self.failing_puts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Storage(format!("Mock put failure for {}", key)));
            }
        }

        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        *self.delete_count.lock().unwrap() += 1;
        self.files.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        Ok(self.files.lock().unwrap().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_and_exists() {
        let store = MemoryStore::new();

        store
            .put("covers/a.jpg", b"jpeg", "image/jpeg")
            .await
            .unwrap();

        assert!(store.exists("covers/a.jpg").await.unwrap());
        assert_eq!(store.get_file("covers/a.jpg").unwrap(), b"jpeg");
        assert_eq!(store.get_put_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_with_file() {
        let store = MemoryStore::new().with_file("covers/old.jpg".to_string(), b"old".to_vec());

        assert!(store.exists("covers/old.jpg").await.unwrap());
        assert!(!store.exists("covers/missing.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_delete_missing_is_ok() {
        let store = MemoryStore::new();

        store.delete("covers/missing.jpg").await.unwrap();
        assert_eq!(store.get_delete_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failing_puts() {
        let store = MemoryStore::new().with_failing_puts(1);

        assert!(store.put("covers/a.jpg", b"x", "image/jpeg").await.is_err());
        assert!(store.put("covers/a.jpg", b"x", "image/jpeg").await.is_ok());
        assert_eq!(store.get_put_count(), 2);
        assert_eq!(store.get_files().len(), 1);
    }
}
