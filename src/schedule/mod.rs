// Recurring trigger and its controller
pub mod controller;
pub mod interval;

pub use controller::ScheduleController;
pub use interval::{translate, TriggerSchedule};
