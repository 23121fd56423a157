//! Current-element sources a host binds to the grid's selection

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use dg_core::{
    ChangeListener, DataSource, ListenerId, ListenerRegistry, Record, SourceError, SourceKind,
    SourceResult,
};

use crate::schema::assign_path;

#[derive(Default)]
struct EntityPointer {
    position: Option<usize>,
    value: Option<Value>,
}

/// A single-entity source pointing into an entity collection
pub struct EntityElement {
    name: String,
    pointer: Mutex<EntityPointer>,
    tracks_position: bool,
    writes: AtomicUsize,
    listeners: ListenerRegistry,
}

impl EntityElement {
    /// Create an empty pointer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer: Mutex::new(EntityPointer::default()),
            tracks_position: true,
            writes: AtomicUsize::new(0),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Do not report positions; the collection must be searched by value
    pub fn without_positions(mut self) -> Self {
        self.tracks_position = false;
        self
    }

    /// Point at an entity from outside the grid and notify listeners
    pub fn set_entity(&self, position: Option<usize>, value: Value) {
        {
            let mut pointer = self.pointer.lock();
            pointer.position = position;
            pointer.value = Some(value);
        }
        debug!(source = %self.name, ?position, "current entity changed");
        self.listeners.emit();
    }

    /// Point at nothing and notify listeners
    pub fn clear(&self) {
        *self.pointer.lock() = EntityPointer::default();
        self.listeners.emit();
    }

    /// Number of `set_position` calls received
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl DataSource for EntityElement {
    fn kind(&self) -> SourceKind {
        SourceKind::Entity
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    async fn length(&self) -> SourceResult<usize> {
        Ok(usize::from(self.pointer.lock().value.is_some()))
    }

    async fn get_value(&self) -> SourceResult<Record> {
        Ok(self.pointer.lock().value.clone().unwrap_or(Value::Null))
    }

    async fn set_value(
        &self,
        path: Option<&str>,
        value: Record,
        fire_event: bool,
    ) -> SourceResult<()> {
        {
            let mut pointer = self.pointer.lock();
            match path {
                None => {
                    pointer.position = None;
                    pointer.value = (!value.is_null()).then_some(value);
                }
                Some(path) => {
                    let entity = pointer.value.get_or_insert(Value::Null);
                    assign_path(entity, path, value)?;
                }
            }
        }
        if fire_event {
            self.listeners.emit();
        }
        Ok(())
    }

    async fn position(&self) -> SourceResult<Option<usize>> {
        if !self.tracks_position {
            return Err(SourceError::unsupported("getPos", self.kind()));
        }
        Ok(self.pointer.lock().position)
    }

    async fn set_position(
        &self,
        index: usize,
        element: Record,
        fire_event: bool,
    ) -> SourceResult<()> {
        {
            let mut pointer = self.pointer.lock();
            pointer.position = Some(index);
            pointer.value = Some(element);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if fire_event {
            self.listeners.emit();
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

/// A scalar source holding one plain value
pub struct ScalarElement {
    name: String,
    value: Mutex<Value>,
    writes: AtomicUsize,
    listeners: ListenerRegistry,
}

impl ScalarElement {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Mutex::new(value),
            writes: AtomicUsize::new(0),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Assign from outside the grid and notify listeners
    pub fn set(&self, value: Value) {
        *self.value.lock() = value;
        self.listeners.emit();
    }

    /// Current value
    pub fn value(&self) -> Value {
        self.value.lock().clone()
    }

    /// Number of `set_value` calls received
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl DataSource for ScalarElement {
    fn kind(&self) -> SourceKind {
        SourceKind::Scalar
    }

    fn source_name(&self) -> &str {
        &self.name
    }

    async fn length(&self) -> SourceResult<usize> {
        Ok(usize::from(!self.value.lock().is_null()))
    }

    async fn get_value(&self) -> SourceResult<Record> {
        Ok(self.value.lock().clone())
    }

    async fn set_value(
        &self,
        path: Option<&str>,
        value: Record,
        fire_event: bool,
    ) -> SourceResult<()> {
        {
            let mut current = self.value.lock();
            match path {
                None => *current = value,
                Some(path) => assign_path(&mut current, path, value)?,
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        if fire_event {
            self.listeners.emit();
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
