pub mod api;
pub mod configuration;
pub mod live;
pub mod server_state;
