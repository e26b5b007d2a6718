// SmartMark state managers
// Managers own user-facing state: the synchronized bookmark list and the add form.

pub mod draft;
pub mod sync_controller;
