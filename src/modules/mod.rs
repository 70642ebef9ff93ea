pub mod gateway;
pub mod history;
pub mod platform;
pub mod relay;
