mod health;
mod lock;

pub use health::HttpClientHealth;
pub use lock::HttpClientLock;
