/// Patient popup aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// View (render model)
pub mod view;

pub use aggregate::{PatientPopup, PopupViewState, Services, AGGREGATE_TYPE};
pub use commands::Command;
pub use events::Event;
pub use view::RequestView;
