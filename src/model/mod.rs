pub mod attendance;
pub mod group;
pub mod role;
pub mod student;
