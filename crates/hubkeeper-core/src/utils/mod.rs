//! Small helpers shared by hosts.

pub mod oauth_params;

pub use oauth_params::{strip_oauth_params, NavigableLocation};
