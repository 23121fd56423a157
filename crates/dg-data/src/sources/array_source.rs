//! In-memory array data source

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use dg_core::{
    ChangeListener, DataSource, ListenerId, ListenerRegistry, Record, SourceError, SourceKind,
    SourceResult, DEFAULT_PAGE_SIZE,
};

use crate::schema::assign_path;

/// A scalar source whose value is an array of records
pub struct ArraySource {
    name: String,
    items: RwLock<Vec<Value>>,
    page_size: usize,
    listeners: ListenerRegistry,
    reads: AtomicUsize,
}

impl ArraySource {
    /// Create a source holding `items`
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(items),
            page_size: DEFAULT_PAGE_SIZE,
            listeners: ListenerRegistry::new(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Override the page size hint
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Replace every record and notify listeners
    pub fn replace(&self, items: Vec<Value>) {
        *self.items.write() = items;
        self.notify_changed();
    }

    /// Append a record and notify listeners
    pub fn push(&self, item: Value) {
        self.items.write().push(item);
        self.notify_changed();
    }

    /// Copy of the current records
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    /// Fire `changed` without modifying anything
    pub fn notify_changed(&self) {
        debug!(source = %self.name, "array source changed");
        self.listeners.emit();
    }

    /// Number of registered `changed` listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of times the whole value has been read
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for ArraySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Array
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn length(&self) -> SourceResult<usize> {
        Ok(self.items.read().len())
    }

    async fn get_value(&self) -> SourceResult<Record> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Array(self.items.read().clone()))
    }

    async fn set_value(
        &self,
        path: Option<&str>,
        value: Record,
        fire_event: bool,
    ) -> SourceResult<()> {
        {
            let mut items = self.items.write();
            match path {
                None => match value {
                    Value::Array(new_items) => *items = new_items,
                    other => return Err(SourceError::unexpected("array", &other)),
                },
                Some(path) => {
                    let mut root = Value::Array(std::mem::take(&mut *items));
                    let result = assign_path(&mut root, path, value);
                    if let Value::Array(restored) = root {
                        *items = restored;
                    }
                    result?;
                }
            }
        }
        if fire_event {
            self.notify_changed();
        }
        Ok(())
    }

    fn add_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::FetchRange;
    use serde_json::json;
    use std::sync::Arc;

    fn people() -> ArraySource {
        ArraySource::new(
            "people",
            vec![json!({"name": "a"}), json!({"name": "b"}), json!({"name": "c"})],
        )
    }

    #[tokio::test]
    async fn test_fetch_range_slices() {
        let source = people();
        let slice = source.fetch_range(FetchRange::new(1, 5), &[]).await.unwrap();
        assert_eq!(slice.length, 3);
        assert_eq!(slice.first, 1);
        assert_eq!(slice.rows, vec![json!({"name": "b"}), json!({"name": "c"})]);
    }

    #[tokio::test]
    async fn test_set_value_path_and_event() {
        let source = people();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        source.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.set_value(Some("1.name"), json!("z"), false).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(source.snapshot()[1], json!({"name": "z"}));

        source.set_value(None, json!([]), true).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(source.length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_value_rejects_non_array() {
        let source = people();
        let result = source.set_value(None, json!({"x": 1}), true).await;
        assert!(matches!(result, Err(SourceError::UnexpectedValue { .. })));
        assert_eq!(source.length().await.unwrap(), 3);

        let out_of_bounds = source.set_value(Some("9.name"), json!("q"), false).await;
        assert!(out_of_bounds.is_err());
        assert_eq!(source.length().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_find_element_position_by_value() {
        let source = people();
        let found = source.find_element_position(&json!({"name": "c"})).await.unwrap();
        assert_eq!(found, Some(2));
        let json_text = source
            .find_element_position(&json!("{\"name\":\"b\"}"))
            .await
            .unwrap();
        assert_eq!(json_text, Some(1));
    }
}
