pub mod fts;
pub mod fts_driver;
pub mod mtls;
pub mod poller;
pub mod prepare;
pub mod semaphore;
pub mod stager;

pub use fts_driver::FtsDriver;
pub use poller::FtsPoller;
pub use prepare::PrepareDriver;
pub use semaphore::PermitRegistry;
pub use stager::StagerDriver;
