//! A small sample aggregate used by store and replay tests.

use eventkeel_core::error::DomainError;
use eventkeel_core::root::AggregateRoot;

use crate::clock::{FixedClock, fixed_now};

/// Aggregate name used by [`widget`].
pub const WIDGET: &str = "Widget";

/// State rebuilt by the widget's handlers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WidgetState {
    /// Current widget name, once created.
    pub name: Option<String>,
    /// Number of `renamed` changes applied.
    pub renames: u32,
}

/// Payload of the `created` change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetCreated {
    /// Initial name.
    pub name: String,
}

impl WidgetCreated {
    /// Creates the payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Payload of the `renamed` change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRenamed {
    /// New name.
    pub name: String,
}

impl WidgetRenamed {
    /// Creates the payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The widget aggregate root.
pub type Widget = AggregateRoot<String, WidgetState>;

/// Creates a fresh widget with its `created` and `renamed` handlers
/// registered and a [`FixedClock`] installed. Renaming to a blank name is
/// rejected with `DomainError::Validation`.
#[must_use]
pub fn widget(id: &str) -> Widget {
    widget_with_id(id.to_owned(), WIDGET)
}

/// Same as [`widget`], for callers that already own the id and name, such as
/// an event store factory.
#[must_use]
pub fn widget_with_id(id: String, name: &str) -> Widget {
    let mut root = Widget::new(id, name).with_clock(FixedClock(fixed_now()));
    root.when_payload("created", |state: &mut WidgetState, p: &WidgetCreated| {
        state.name = Some(p.name.clone());
        Ok(())
    });
    root.when_payload("renamed", |state: &mut WidgetState, p: &WidgetRenamed| {
        if p.name.trim().is_empty() {
            return Err(DomainError::Validation("widget name must not be blank".to_owned()));
        }
        state.name = Some(p.name.clone());
        state.renames += 1;
        Ok(())
    });
    root
}
