//! A budgeted collection pass: entry check, collect, post-pass check.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetDecision, RunBudgeter};
use crate::collector::{CollectionOutcome, CoverageCollector};
use crate::config::CollectorConfig;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "campaign", rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// The sentinel was already there; nothing ran.
    Halted { diagnostic: String },
    /// One pass ran. `stop` says whether the deadline has now been hit.
    Ran {
        collection: CollectionOutcome,
        stop: BudgetDecision,
    },
}

pub struct CoverageCampaign {
    config: CollectorConfig,
}

impl CoverageCampaign {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// The sentinel is checked before anything else, including the
    /// collector configuration.
    pub async fn run(&self) -> Result<CampaignOutcome> {
        let budgeter = RunBudgeter::new(&self.config.working_folder, self.config.end_timestamp);
        if let BudgetDecision::Halt { diagnostic } = budgeter.check_entry() {
            return Ok(CampaignOutcome::Halted { diagnostic });
        }

        let collection = CoverageCollector::new(self.config.clone()).collect().await?;
        let stop = budgeter.check_after_pass(Utc::now())?;
        Ok(CampaignOutcome::Ran { collection, stop })
    }
}
