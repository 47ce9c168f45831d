pub mod user_service_client;

pub use user_service_client::HttpUserDirectory;
