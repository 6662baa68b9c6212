pub mod clock;
pub mod dashboard_cache;
pub mod db_utils;
