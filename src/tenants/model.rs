/*
 * This file is part of the Obvia ERP.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// The billable identity that owns at most one [`crate::instances::model::Instance`]
/// (enforced by `instances_one_active_per_tenant`, not by anything in here).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub federated_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub subscription_state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn is_anonymized(&self) -> bool {
        self.anonymized_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    None,
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::None => "none",
            SubscriptionState::Trialing => "trialing",
            SubscriptionState::Active => "active",
            SubscriptionState::PastDue => "past_due",
            SubscriptionState::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for SubscriptionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SubscriptionState::None),
            "trialing" => Ok(SubscriptionState::Trialing),
            "active" => Ok(SubscriptionState::Active),
            "past_due" => Ok(SubscriptionState::PastDue),
            "cancelled" => Ok(SubscriptionState::Cancelled),
            other => Err(format!("unknown subscription_state: {other}")),
        }
    }
}
