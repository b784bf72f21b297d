//! Pull-based event readers.
//!
//! Every reader is finite and non-restartable. Pulling past the end is a
//! caller bug and panics; `has_next` must be consulted first.

use crate::error::StroapError;
use crate::event::Event;
use std::borrow::Cow;

/// Source of XML events.
pub trait EventReader {
    /// Whether another event can be pulled.
    fn has_next(&mut self) -> bool;

    /// Pull the next event.
    ///
    /// # Panics
    ///
    /// Panics when the reader is exhausted.
    fn next_event(&mut self) -> Result<Event, StroapError>;

    /// The event the next `next_event` call would return, or `None` when
    /// exhausted.
    fn peek(&mut self) -> Result<Option<Event>, StroapError>;
}

impl<R: EventReader + ?Sized> EventReader for Box<R> {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        (**self).next_event()
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        (**self).peek()
    }
}

impl<R: EventReader + ?Sized> EventReader for &mut R {
    fn has_next(&mut self) -> bool {
        (**self).has_next()
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        (**self).next_event()
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        (**self).peek()
    }
}

/// Pull every remaining event of `reader`.
pub fn drain<R: EventReader + ?Sized>(reader: &mut R) -> Result<Vec<Event>, StroapError> {
    let mut events = Vec::new();
    while reader.has_next() {
        events.push(reader.next_event()?);
    }
    Ok(events)
}

/// Reader over an in-memory event sequence, borrowed or owned.
#[derive(Debug, Clone)]
pub struct BufferedEventReader<'a> {
    events: Cow<'a, [Event]>,
    position: usize,
}

impl<'a> BufferedEventReader<'a> {
    pub fn new(events: impl Into<Cow<'a, [Event]>>) -> Self {
        Self {
            events: events.into(),
            position: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl EventReader for BufferedEventReader<'_> {
    fn has_next(&mut self) -> bool {
        self.position < self.events.len()
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        let event = self
            .events
            .get(self.position)
            .cloned()
            .expect("no more events: buffered reader is exhausted");
        self.position += 1;
        Ok(event)
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        Ok(self.events.get(self.position).cloned())
    }
}

/// Reader that drains several readers one after the other.
pub struct ChainedEventReader<'a> {
    readers: Vec<Box<dyn EventReader + 'a>>,
    current: usize,
}

impl<'a> ChainedEventReader<'a> {
    pub fn new(readers: Vec<Box<dyn EventReader + 'a>>) -> Self {
        Self {
            readers,
            current: 0,
        }
    }

    /// Skip exhausted readers; returns the index of the first live one.
    fn live(&mut self) -> Option<usize> {
        while self.current < self.readers.len() {
            if self.readers[self.current].has_next() {
                return Some(self.current);
            }
            self.current += 1;
        }
        None
    }
}

impl EventReader for ChainedEventReader<'_> {
    fn has_next(&mut self) -> bool {
        self.live().is_some()
    }

    fn next_event(&mut self) -> Result<Event, StroapError> {
        let index = self
            .live()
            .expect("no more events: chained reader is exhausted");
        self.readers[index].next_event()
    }

    fn peek(&mut self) -> Result<Option<Event>, StroapError> {
        match self.live() {
            Some(index) => self.readers[index].peek(),
            None => Ok(None),
        }
    }
}
