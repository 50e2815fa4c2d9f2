//! Admission control: client identity, the global throttle and the gate that
//! ties them to the per-client buckets.

mod gate;
mod identity;
mod throttle;

pub use gate::{AdmissionGate, AdmissionTicket, Decision};
pub use identity::{split_host_port, ClientIdentity};
pub use throttle::{GlobalThrottle, ThrottlePermit};
