//! TIPSY switch orchestrator.
//!
//! Drives one Lagopus switch through a benchmark run: launches the switch,
//! waits for it to connect, installs the configured pipeline and then
//! executes the pipeline's runtime commands once per benchmark timer tick.
//!
//! The protocol adapter that owns the OpenFlow session feeds
//! [`DatapathEvent`](tipsy_openflow::DatapathEvent)s into the control loop
//! through a [`ControlHandle`].

pub mod cores;
pub mod error;
pub mod event;
pub mod notify;
pub mod orch;
pub mod process;
pub mod rest_api;
pub mod service;
pub mod settings;
pub mod shell;
pub mod status;
pub mod timer;

pub use cores::CoreAllocation;
pub use error::{ControllerError, ControllerResult};
pub use event::ControlEvent;
pub use notify::{Notifier, WebhookNotifier};
pub use orch::Orchestrator;
pub use process::{DatapathProcess, LagopusProcess};
pub use service::{run, ControlHandle};
pub use settings::{ControllerSettings, LagopusSettings};
pub use status::{OrchStatus, StatusChange};
pub use timer::{BenchmarkTimer, FiringPermit, Overrun};
