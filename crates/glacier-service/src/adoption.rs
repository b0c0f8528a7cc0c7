//! Adoption milestones and the current active-user count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use glacier_core::error::Error;

use glacier_engine::rate::base_mining_rate;

use crate::state::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionMilestone {
    pub achieved_at: DateTime<Utc>,
    pub base_mining_rate: String,
    pub milestone: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptionSummary {
    pub total_active_users: u64,
    pub milestones: Vec<AdoptionMilestone>,
}

impl ServiceState {
    /// Milestone timeline for the user plus the current bucket's active-user
    /// count.
    pub async fn get_adoption_summary(&self, user_id: &str) -> Result<AdoptionSummary, Error> {
        let now = Utc::now();
        let total_active_users = self.total_active_users(now).await?;

        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        let created_at = usr.created_at.ok_or(Error::RelationNotFound)?;

        let adoption = &self.cfg.adoption;
        let milestones = (0..adoption.milestones as u64)
            .map(|i| {
                let achieved_at =
                    created_at + adoption.duration_between_milestones() * i as i32;
                AdoptionMilestone {
                    achieved_at,
                    base_mining_rate: format!(
                        "{:.20}",
                        base_mining_rate(achieved_at, usr.created_at, adoption)
                    ),
                    milestone: i + 1,
                }
            })
            .collect();

        Ok(AdoptionSummary {
            total_active_users,
            milestones,
        })
    }
}
