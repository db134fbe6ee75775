pub mod attendance;
pub mod groups;
pub mod payments;
pub mod students;
