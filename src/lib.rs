//! Core library for the Aerolog flight-log collection service.
//!
//! The crate orchestrates one end-to-end run: power on the emulator
//! instance, open an automation session, drive the pilot app through its
//! login flow (resolving a CAPTCHA challenge when one appears), trigger
//! flight-record synchronization, collect the log artifacts, and always
//! release the session and the instance afterwards. External systems —
//! the compute control plane, the automation endpoint, the challenge
//! solver, and the copy routine — sit behind narrow collaborator traits.

pub mod artifacts;
pub mod captcha;
pub mod config;
pub mod device;
pub mod instance;
pub mod login;
pub mod provider;
pub mod run;
pub mod runlog;
pub mod test_support;

pub use artifacts::{ArtifactCollector, ArtifactSummary, HttpArtifactCollector};
pub use captcha::{
    CaptchaCoordinator, CaptchaError, CaptchaSolver, ChallengeStore, HttpCaptchaSolver,
};
pub use config::{ArtifactConfig, CaptchaConfig, ConfigError, DeviceConfig, InstanceConfig};
pub use device::{
    AutomationDriver, AutomationSession, DeviceProfile, DriverError, ElementRegion, Locator,
    MatchRule, SessionError, SessionSupervisor, Widget, WireDriver,
};
pub use instance::{
    DeviceLink, InstanceError, InstanceSupervisor, SupervisorTimings, TcpDeviceLink, WaitGuard,
};
pub use login::{Credentials, LoginError, LoginFlow, LoginLocators, LoginOutcome, LoginTimings};
pub use provider::{HttpInstanceProvider, InstanceProvider, InstanceState, StatusKind};
pub use run::{
    ErrorRecord, Pipeline, PipelineTimings, ResponseSink, RunError, RunMode, RunReport, RunState,
    SkipDirective, Stage, WriterSink,
};
pub use runlog::RunLog;
