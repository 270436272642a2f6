//! Persistent retry queue: a JSON array on disk, mirrored in memory.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use soulprint_state::{read_json, write_json_atomic};

pub struct DiskQueue<T> {
    path: PathBuf,
    items: Mutex<Vec<T>>,
}

impl<T: Serialize + DeserializeOwned + Clone> DiskQueue<T> {
    /// Open the queue, loading any items left over from a previous run.
    pub fn open(path: PathBuf) -> Self {
        let items = match read_json::<Vec<T>>(&path) {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "anchor queue unreadable; starting empty");
                Vec::new()
            }
        };
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.lock().expect("queue lock");
        items.push(item);
        self.persist(&items);
    }

    /// Take everything, leaving the queue (and its file) empty.
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock().expect("queue lock");
        let drained = std::mem::take(&mut *items);
        self.persist(&items);
        drained
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, items: &[T]) {
        if let Err(e) = write_json_atomic(&self.path, &items.to_vec()) {
            warn!(path = %self.path.display(), error = %e, "anchor queue persist failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survives_reopen() {
        let dir = std::env::temp_dir().join(format!("soulprint_queue_{}", std::process::id()));
        let path = dir.join("anchor-test.json");
        let _ = std::fs::remove_file(&path);

        let q: DiskQueue<String> = DiskQueue::open(path.clone());
        q.push("a".into());
        q.push("b".into());
        drop(q);

        let q2: DiskQueue<String> = DiskQueue::open(path);
        assert_eq!(q2.len(), 2);
        assert_eq!(q2.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(q2.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
