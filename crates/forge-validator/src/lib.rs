//! Forge Compliance Validator
//!
//! Judges a policy-clean candidate in six ordered stages:
//!
//! | stage | checks | blocking |
//! |---|---|---|
//! | A syntax | candidate parses | yes, aborts the rest |
//! | B imports | required imports; discouraged imports warn | yes |
//! | C structural | server, entrypoints, tool schemas, transport | yes |
//! | D domain | OAuth wiring, `authenticate` tool, env-loaded credentials | yes |
//! | E robustness | try/except coverage, HTTP status checks | no |
//! | F sandbox | out-of-process listing and bootstrap invocation | yes, if a sandbox is attached |
//!
//! Stage F only runs when A and C passed.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cancel;
pub mod error;
pub mod process;
pub mod report;
pub mod rules;
pub mod sandbox;
pub mod validator;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use error::{SandboxError, ValidatorError};
pub use process::{ProcessSandbox, SandboxConfig, PLACEHOLDER_VALUE};
pub use report::{Finding, FindingCode, Stage, StageOutcome, StageResult, ValidationReport};
pub use rules::ValidatorRules;
pub use sandbox::{HarnessReport, HarnessTool, Sandbox, SandboxOutcome, SandboxProbe};
pub use validator::{ComplianceValidator, ValidationContext};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
