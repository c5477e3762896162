pub mod cell;
pub mod random_provider;
pub mod thread_pool;

pub use cell::MutCell;
pub use thread_pool::{ThreadPool, WaitGroup, WorkResult};
pub(crate) use thread_pool::get_thread_pool;
