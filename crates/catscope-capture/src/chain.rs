use catscope_types::Message;

use crate::filter::MessageFilter;

/// Handle returned by [`FilterChain::add`], used to remove the filter again
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterId(u64);

/// Ordered set of filters; a message passes only if every filter accepts it
#[derive(Clone, Debug, Default)]
pub struct FilterChain {
    filters: Vec<(FilterId, MessageFilter)>,
    next_id: u64,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter
    pub fn add(&mut self, filter: MessageFilter) -> FilterId {
        let id = FilterId(self.next_id);
        self.next_id += 1;
        self.filters.push((id, filter));
        id
    }

    /// Remove a filter, returning it if it was present
    pub fn remove(&mut self, id: FilterId) -> Option<MessageFilter> {
        let index = self.filters.iter().position(|(fid, _)| *fid == id)?;
        Some(self.filters.remove(index).1)
    }

    /// Evaluate filters in insertion order, stopping at the first rejection
    pub fn accepts(&self, message: &Message) -> bool {
        self.filters.iter().all(|(_, filter)| filter.accepts(message))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageFilter> {
        self.filters.iter().map(|(_, filter)| filter)
    }
}
