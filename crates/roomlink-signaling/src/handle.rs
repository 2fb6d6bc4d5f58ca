//! Handles: the gateway-side plugin attachments this session owns.

use std::collections::HashMap;

use roomlink_core::GatewayId;

// MARK: - Handle

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    Publisher,
    Subscriber,
}

/// One attached plugin endpoint: the local publisher, or a subscriber for a
/// remote feed. `feed_id` never changes after creation; for the publisher it
/// equals `handle_id` ("own feed").
#[derive(Debug, Clone)]
pub struct Handle {
    pub handle_id: GatewayId,
    pub feed_id: GatewayId,
    pub role: HandleRole,
    pub display: Option<String>,
    detaching: bool,
}

impl Handle {
    pub fn publisher(handle_id: GatewayId, display: Option<String>) -> Self {
        Self {
            feed_id: handle_id.clone(),
            handle_id,
            role: HandleRole::Publisher,
            display,
            detaching: false,
        }
    }

    pub fn subscriber(
        handle_id: GatewayId,
        feed_id: GatewayId,
        display: Option<String>,
    ) -> Self {
        Self {
            handle_id,
            feed_id,
            role: HandleRole::Subscriber,
            display,
            detaching: false,
        }
    }

    /// True once a `detach` has been issued and its reply is outstanding.
    pub fn is_detaching(&self) -> bool {
        self.detaching
    }
}

// MARK: - HandleTable

/// Registry of live handles plus the feed → handle index.
///
/// All mutation goes through [`insert`](HandleTable::insert) and
/// [`remove`](HandleTable::remove) so the two maps never disagree: exactly
/// one live handle per feed, and removal is atomic.
#[derive(Debug, Default)]
pub struct HandleTable {
    handles: HashMap<GatewayId, Handle>,
    feeds: HashMap<GatewayId, GatewayId>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: Handle) {
        self.feeds
            .insert(handle.feed_id.clone(), handle.handle_id.clone());
        self.handles.insert(handle.handle_id.clone(), handle);
    }

    pub fn remove(&mut self, handle_id: &GatewayId) -> Option<Handle> {
        let handle = self.handles.remove(handle_id)?;
        self.feeds.remove(&handle.feed_id);
        Some(handle)
    }

    pub fn get(&self, handle_id: &GatewayId) -> Option<&Handle> {
        self.handles.get(handle_id)
    }

    pub fn contains(&self, handle_id: &GatewayId) -> bool {
        self.handles.contains_key(handle_id)
    }

    /// Resolves a feed to its live handle. A feed with no live handle is
    /// simply absent, not an error.
    pub fn handle_for_feed(&self, feed_id: &GatewayId) -> Option<&Handle> {
        self.feeds
            .get(feed_id)
            .and_then(|handle_id| self.handles.get(handle_id))
    }

    pub fn contains_feed(&self, feed_id: &GatewayId) -> bool {
        self.feeds.contains_key(feed_id)
    }

    pub fn mark_detaching(&mut self, handle_id: &GatewayId) {
        if let Some(handle) = self.handles.get_mut(handle_id) {
            handle.detaching = true;
        }
    }

    pub fn clear(&mut self) {
        self.handles.clear();
        self.feeds.clear();
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_feed_equals_handle() {
        let handle = Handle::publisher(GatewayId::from(7), Some("alice".into()));
        assert_eq!(handle.feed_id, handle.handle_id);
        assert_eq!(handle.role, HandleRole::Publisher);
    }

    #[test]
    fn subscriber_keeps_the_remote_feed() {
        let handle =
            Handle::subscriber(GatewayId::from(101), GatewayId::from(9), Some("bob".into()));
        assert_eq!(handle.feed_id, GatewayId::from(9));
        assert_eq!(handle.role, HandleRole::Subscriber);
        assert_ne!(handle.feed_id, handle.handle_id);
    }

    #[test]
    fn insert_registers_both_maps() {
        let mut table = HandleTable::new();
        table.insert(Handle::subscriber(GatewayId::from(101), GatewayId::from(9), None));
        assert!(table.contains(&GatewayId::from(101)));
        assert!(table.contains_feed(&GatewayId::from(9)));
        assert_eq!(
            table.handle_for_feed(&GatewayId::from(9)).unwrap().handle_id,
            GatewayId::from(101)
        );
    }

    #[test]
    fn remove_is_atomic_across_both_maps() {
        let mut table = HandleTable::new();
        table.insert(Handle::subscriber(GatewayId::from(101), GatewayId::from(9), None));
        let removed = table.remove(&GatewayId::from(101)).unwrap();
        assert_eq!(removed.feed_id, GatewayId::from(9));
        assert!(!table.contains(&GatewayId::from(101)));
        assert!(!table.contains_feed(&GatewayId::from(9)));
        assert!(table.is_empty());
    }

    #[test]
    fn absent_feed_resolves_to_none() {
        let mut table = HandleTable::new();
        assert!(table.handle_for_feed(&GatewayId::from(9)).is_none());
        assert!(table.remove(&GatewayId::from(9)).is_none());
    }

    #[test]
    fn mark_detaching_flags_the_handle() {
        let mut table = HandleTable::new();
        table.insert(Handle::publisher(GatewayId::from(7), None));
        assert!(!table.get(&GatewayId::from(7)).unwrap().is_detaching());
        table.mark_detaching(&GatewayId::from(7));
        assert!(table.get(&GatewayId::from(7)).unwrap().is_detaching());
    }
}
