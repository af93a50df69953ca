pub mod app_state;
pub mod client_ip;
pub mod errors;
pub mod extract;
pub mod startup;
