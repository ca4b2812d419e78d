//! parkhaus-client: simulated drivers competing for parkhaus spots.

mod driver;

pub use driver::{ClientError, Driver, DriverConfig, DriverOutcome, DriverReport, run_drivers};
