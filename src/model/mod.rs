pub mod attendance;
pub mod calendar;
pub mod member;
pub mod notification;
pub mod role;
pub mod stats;
