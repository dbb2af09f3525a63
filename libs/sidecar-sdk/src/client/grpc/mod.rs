mod lock;

pub use lock::{GrpcClientLock, LockRpc};
