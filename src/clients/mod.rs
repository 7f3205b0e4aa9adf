pub mod fetch_client;

pub use fetch_client::FetchClient;
