//! Tenant allowance checks.
//!
//! A tenant is within limits while inside its trial window or while its
//! contact count stays at or below the free allowance.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::billing::{
    FREE_CONTACT_LIMIT, PRO_BLOCK_SIZE, PRO_PRICE_PER_BLOCK, TRIAL_DAYS, WARNING_MARGIN,
};
use crate::error::{AppError, AppResult};
use crate::repository::{BotRepository, TenantRepository, VisitorRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatus {
    pub within_limits: bool,
    pub age_days: i64,
    pub contact_count: u64,
}

impl BillingStatus {
    pub fn evaluate(created_at: DateTime<Utc>, now: DateTime<Utc>, contact_count: u64) -> Self {
        let age_days = (now - created_at).num_days().max(0);
        Self {
            within_limits: age_days <= TRIAL_DAYS || contact_count <= FREE_CONTACT_LIMIT,
            age_days,
            contact_count,
        }
    }
}

/// Answers whether the tenant behind a bot may keep capturing leads
#[async_trait]
pub trait BillingOracle: Send + Sync {
    async fn check_limits(&self, bot_id: &str) -> AppResult<BillingStatus>;
}

/// Oracle backed by the tenant's signup date and stored contact count
pub struct RepositoryBillingOracle<R: ?Sized> {
    repo: Arc<R>,
}

impl<R: ?Sized> RepositoryBillingOracle<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R> BillingOracle for RepositoryBillingOracle<R>
where
    R: BotRepository + TenantRepository + VisitorRepository + ?Sized,
{
    async fn check_limits(&self, bot_id: &str) -> AppResult<BillingStatus> {
        let bot = self
            .repo
            .find_bot_by_id(bot_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("bot {}", bot_id)))?;
        let tenant = self
            .repo
            .find_tenant_by_id(&bot.tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", bot.tenant_id)))?;
        let contacts = self.repo.count_visitors_for_tenant(&tenant.id).await?;
        Ok(BillingStatus::evaluate(tenant.created_at, Utc::now(), contacts))
    }
}

/// Notice shown to the owner once the free allowance is close or exceeded
pub fn billing_message(contact_count: u64) -> Option<String> {
    if contact_count > FREE_CONTACT_LIMIT {
        Some(format!(
            "⚠️ You've exceeded the free tier ({}/{} contacts). Consider upgrading to Pro!",
            contact_count, FREE_CONTACT_LIMIT
        ))
    } else if contact_count > FREE_CONTACT_LIMIT.saturating_sub(WARNING_MARGIN) {
        Some(format!(
            "📊 You're approaching the free tier limit ({}/{} contacts).",
            contact_count, FREE_CONTACT_LIMIT
        ))
    } else {
        None
    }
}

/// Monthly Pro price in USD: a flat rate per started block of contacts
pub fn pro_cost(contact_count: u64) -> u64 {
    contact_count.div_ceil(PRO_BLOCK_SIZE) * PRO_PRICE_PER_BLOCK
}
