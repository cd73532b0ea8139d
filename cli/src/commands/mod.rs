pub mod clean;
pub mod list;
pub mod next;
