//! Calendar provider implementations
//!
//! Each provider implements the `CalendarProvider` port from
//! `semestra-core`, scoped to one calendar id per call.

pub mod google;
pub mod microsoft;

pub use google::GoogleCalendarProvider;
pub use microsoft::MicrosoftCalendarProvider;
