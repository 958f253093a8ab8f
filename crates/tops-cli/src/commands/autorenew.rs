use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use tops_acme::autorenew::authorize;
use tops_acme::status::{JOB_STARTED_MESSAGE, STATUS_FAILED};
use tops_acme::RenewalCandidateSource;
use tracing::info;

use super::services::Services;

#[derive(Args)]
pub struct AutoRenewCommand {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "tops.json", env = "TOPS_CONFIG")]
    pub config: PathBuf,

    /// Username recorded in change log entries
    #[arg(long, default_value = "admin", env = "TOPS_USER")]
    pub user: String,

    /// Only renew delivery services on this CDN
    #[arg(long)]
    pub cdn: Option<String>,
}

impl AutoRenewCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let services = Services::build(&self.config).await?;
        let state = &services.state;

        let candidates = RenewalCandidateSource::new(state.db.clone())
            .list_candidates(self.cdn.as_deref())
            .await?;
        authorize(state.db.as_ref(), &self.user, &candidates).await?;

        let status_id = state.status.create(JOB_STARTED_MESSAGE).await?;
        info!(
            "renewing {} candidate(s), status id {}",
            candidates.len(),
            status_id
        );
        let report = state
            .renewal_job
            .run(&candidates, status_id, &self.user)
            .await;
        services.shutdown().await;

        println!(
            "{} renewed, {} errors, {} examined, {} reported",
            report.renewed,
            report.errors,
            report.total,
            report.summary.len()
        );
        for outcome in report
            .summary
            .other
            .iter()
            .filter(|o| o.error.is_some())
        {
            println!(
                "  {} v{}: {}",
                outcome.xml_id,
                outcome.version,
                outcome.error.as_deref().unwrap_or_default()
            );
        }

        if report.status == STATUS_FAILED {
            bail!("ACME renewal failed");
        }
        Ok(())
    }
}
