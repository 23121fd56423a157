//! Named grid events published to the embedding application

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Event bus delivering grid events to host handlers
pub struct EventBus {
    handlers: Arc<Mutex<AHashMap<GridEventKind, Vec<Box<dyn EventHandler>>>>>,
}

/// The events a grid emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GridEventKind {
    Select,
    Click,
    DoubleClick,
    HeaderClick,
    HeaderDoubleClick,
    CellClick,
    CellDoubleClick,
    KeyDown,
    KeyUp,
    MouseEnter,
    MouseLeave,
    CellMouseEnter,
    SaveState,
}

impl GridEventKind {
    /// Every event, in the order the host lists them
    pub const ALL: [GridEventKind; 13] = [
        GridEventKind::Select,
        GridEventKind::Click,
        GridEventKind::DoubleClick,
        GridEventKind::HeaderClick,
        GridEventKind::HeaderDoubleClick,
        GridEventKind::CellClick,
        GridEventKind::CellDoubleClick,
        GridEventKind::KeyDown,
        GridEventKind::KeyUp,
        GridEventKind::MouseEnter,
        GridEventKind::MouseLeave,
        GridEventKind::CellMouseEnter,
        GridEventKind::SaveState,
    ];

    /// Wire name of the event
    pub fn name(self) -> &'static str {
        match self {
            GridEventKind::Select => "onselect",
            GridEventKind::Click => "onclick",
            GridEventKind::DoubleClick => "ondblclick",
            GridEventKind::HeaderClick => "onheaderclick",
            GridEventKind::HeaderDoubleClick => "onheaderdblclick",
            GridEventKind::CellClick => "oncellclick",
            GridEventKind::CellDoubleClick => "oncelldblclick",
            GridEventKind::KeyDown => "onkeydown",
            GridEventKind::KeyUp => "onkeyup",
            GridEventKind::MouseEnter => "onmouseenter",
            GridEventKind::MouseLeave => "onmouseleave",
            GridEventKind::CellMouseEnter => "oncellmouseenter",
            GridEventKind::SaveState => "onsavestate",
        }
    }

    /// Look an event up by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for GridEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload carried by every event: `{row, name}` or `{row, name, value}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventPayload {
    /// Absolute row index, when the event concerns a row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Column id or key name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl EventPayload {
    pub fn row(row: usize) -> Self {
        Self {
            row: Some(row),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// One emitted event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridEvent {
    pub kind: GridEventKind,
    pub payload: EventPayload,
}

/// Handler trait for event handlers
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &GridEvent);
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Subscribe to events of a specific kind
    pub fn subscribe(&self, kind: GridEventKind, handler: Box<dyn EventHandler>) {
        let mut handlers = self.handlers.lock();
        handlers.entry(kind).or_insert_with(Vec::new).push(handler);
    }

    /// Subscribe one handler to every event kind
    pub fn subscribe_all<F>(&self, f: F)
    where
        F: Fn(&GridEvent) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        for kind in GridEventKind::ALL {
            let f = f.clone();
            self.subscribe(kind, handler_from_fn(move |event| f(event)));
        }
    }

    /// Publish an event
    pub fn publish(&self, kind: GridEventKind, payload: EventPayload) {
        let event = GridEvent { kind, payload };
        let mut handlers = self.handlers.lock();

        if let Some(event_handlers) = handlers.get_mut(&kind) {
            for handler in event_handlers.iter_mut() {
                handler.handle(&event);
            }
        }
    }

    /// Whether anything listens to `kind`
    pub fn has_handlers(&self, kind: GridEventKind) -> bool {
        self.handlers
            .lock()
            .get(&kind)
            .map(|handlers| !handlers.is_empty())
            .unwrap_or(false)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper struct for creating event handlers from closures
pub struct ClosureEventHandler<F> {
    handler: F,
}

impl<F> EventHandler for ClosureEventHandler<F>
where
    F: FnMut(&GridEvent) + Send + Sync,
{
    fn handle(&mut self, event: &GridEvent) {
        (self.handler)(event);
    }
}

/// Create an event handler from a closure
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&GridEvent) + Send + Sync + 'static,
{
    Box::new(ClosureEventHandler { handler: f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_names_round_trip() {
        for kind in GridEventKind::ALL {
            assert_eq!(GridEventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(GridEventKind::from_name("onwhatever"), None);
    }

    #[test]
    fn test_publish_only_reaches_matching_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe(
            GridEventKind::CellClick,
            handler_from_fn(move |event| sink.lock().push(event.clone())),
        );

        bus.publish(GridEventKind::Click, EventPayload::row(1));
        bus.publish(
            GridEventKind::CellClick,
            EventPayload::row(2).with_name("name").with_value(json!("b")),
        );

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload.row, Some(2));
        assert_eq!(seen[0].payload.name.as_deref(), Some("name"));
        assert_eq!(seen[0].payload.value, Some(json!("b")));
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload = EventPayload::row(3).with_name("age");
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({"row": 3, "name": "age"}));
    }
}
