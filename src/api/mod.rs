pub mod attendance;
pub mod dashboard;
pub mod regularization;
