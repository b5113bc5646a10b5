//! Shared test fixtures and utilities for eventkeel.

mod clock;
mod logging;
mod widget;

pub use clock::{FixedClock, fixed_now};
pub use logging::init_tracing;
pub use widget::{
    WIDGET, Widget, WidgetCreated, WidgetRenamed, WidgetState, widget, widget_with_id,
};
