pub mod broker;
pub mod intake;

pub use broker::{BrokerError, JobBroker, JobEnvelope};
pub use intake::{IntakeError, JobIntake};
