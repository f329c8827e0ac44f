//! qdiff coverage orchestration
//!
//! Drives external coverage collection scripts over a fuzzing working folder:
//! - Runs every `collect_*.sh` script against the folder
//! - Files the produced reports into numbered result folders
//! - Carries forward the latest stats line and records timing
//! - Stops a campaign for good once its wall-clock budget is spent

pub mod budget;
pub mod campaign;
pub mod collector;
pub mod config;
pub mod error;
pub mod followup;
pub mod rotator;
pub mod runner;
pub mod script;
pub mod stats;

// Re-export key types
pub use budget::{mark_exceeded, should_stop, BudgetDecision, RunBudgeter, Sentinel};
pub use campaign::{CampaignOutcome, CoverageCampaign};
pub use collector::{CollectionOutcome, CollectionReport, CoverageCollector};
pub use config::{CollectorConfig, FOLLOWUP_ENV, SCRIPTS_DIR_ENV};
pub use error::{CoverageError, Result};
pub use followup::FollowUpCommand;
pub use runner::{ScriptResult, ScriptRunner};
pub use script::{discover_scripts, CollectionScript};
