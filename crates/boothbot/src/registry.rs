//! Bot instance registry.
//!
//! Maps a bot id to a live client, building it on first use from the stored
//! credentials. Construction for one id is single-flight: concurrent first
//! deliveries wait on the same cell, and a failed build leaves nothing
//! behind so the next delivery retries.

use std::sync::Arc;

use dashmap::DashMap;
use teloxide::types::Update;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use boothcore::error::AppError;
use boothcore::types::{BotId, BotRecord};

use crate::context::Services;
use crate::messenger::{BotClient, BotClientFactory};
use crate::middleware;
use crate::update::Incoming;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Bot not found: {0}")]
    BotNotFound(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(#[from] serde_json::Error),

    #[error("Failed to connect bot: {0}")]
    Connect(AppError),

    #[error("Storage error: {0}")]
    Storage(AppError),
}

/// A connected tenant bot
pub struct BotInstance {
    record: BotRecord,
    client: BotClient,
    services: Arc<Services>,
    cancel: CancellationToken,
}

impl BotInstance {
    pub fn new(record: BotRecord, client: BotClient, services: Arc<Services>) -> Self {
        Self {
            record,
            client,
            services,
            cancel: CancellationToken::new(),
        }
    }

    pub fn record(&self) -> &BotRecord {
        &self.record
    }

    pub fn username(&self) -> &str {
        &self.client.username
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Feeds one update through the middleware pipeline. Updates the engine
    /// doesn't react to, and anything arriving after `stop`, are dropped.
    pub async fn handle_update(&self, update: &Update) {
        if self.is_stopped() {
            tracing::debug!(bot_id = %self.record.id, "Dropping update for stopped bot");
            return;
        }
        let Some(incoming) = Incoming::from_update(update) else {
            tracing::debug!(bot_id = %self.record.id, update_id = update.id.0, "Ignoring unsupported update");
            return;
        };
        middleware::process_update(
            &self.record,
            &self.client.username,
            self.client.messenger.clone(),
            self.services.clone(),
            incoming,
        )
        .await;
    }
}

type Slot = Arc<OnceCell<Arc<BotInstance>>>;

pub struct BotRegistry {
    services: Arc<Services>,
    factory: Arc<dyn BotClientFactory>,
    instances: DashMap<BotId, Slot>,
}

impl BotRegistry {
    pub fn new(services: Arc<Services>, factory: Arc<dyn BotClientFactory>) -> Self {
        Self {
            services,
            factory,
            instances: DashMap::new(),
        }
    }

    pub fn factory(&self) -> &Arc<dyn BotClientFactory> {
        &self.factory
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached instance, or one built from storage. `Ok(None)` when no stored
    /// bot has this id.
    pub async fn get_instance(&self, bot_id: &str) -> Result<Option<Arc<BotInstance>>, WebhookError> {
        let slot = self
            .instances
            .entry(bot_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let built = slot.get_or_try_init(|| self.build(bot_id)).await.cloned();
        match built {
            Ok(instance) => Ok(Some(instance)),
            Err(e) => {
                self.instances
                    .remove_if(bot_id, |_, current| Arc::ptr_eq(current, &slot) && !current.initialized());
                match e {
                    WebhookError::BotNotFound(_) => Ok(None),
                    other => Err(other),
                }
            }
        }
    }

    async fn build(&self, bot_id: &str) -> Result<Arc<BotInstance>, WebhookError> {
        let record = self
            .services
            .repo
            .find_bot_by_id(bot_id)
            .await
            .map_err(WebhookError::Storage)?
            .ok_or_else(|| WebhookError::BotNotFound(bot_id.to_string()))?;
        self.connect(record).await
    }

    async fn connect(&self, record: BotRecord) -> Result<Arc<BotInstance>, WebhookError> {
        let client = self.factory.connect(&record.token).await.map_err(WebhookError::Connect)?;
        tracing::info!(bot_id = %record.id, username = %client.username, "Bot instance initialized");
        Ok(Arc::new(BotInstance::new(record, client, self.services.clone())))
    }

    /// Connects `record` and installs it, replacing (and stopping) any
    /// instance already registered under its id.
    pub async fn register(&self, record: BotRecord) -> Result<Arc<BotInstance>, WebhookError> {
        let instance = self.connect(record).await?;
        self.insert(instance.clone());
        Ok(instance)
    }

    /// Installs an already connected client
    pub fn install(&self, record: BotRecord, client: BotClient) -> Arc<BotInstance> {
        let instance = Arc::new(BotInstance::new(record, client, self.services.clone()));
        self.insert(instance.clone());
        instance
    }

    fn insert(&self, instance: Arc<BotInstance>) {
        let bot_id = instance.record.id.clone();
        let slot = Arc::new(OnceCell::new_with(Some(instance)));
        if let Some(previous) = self.instances.insert(bot_id, slot) {
            if let Some(old) = previous.get() {
                old.stop();
            }
        }
    }

    /// Stops and evicts an instance. The next delivery for the id rebuilds
    /// it from storage.
    pub fn unregister(&self, bot_id: &str) -> bool {
        match self.instances.remove(bot_id) {
            Some((_, slot)) => {
                if let Some(instance) = slot.get() {
                    instance.stop();
                    tracing::info!(bot_id, "Bot instance unregistered");
                }
                true
            }
            None => false,
        }
    }

    /// Parses a raw webhook body and hands it to the bot's instance
    pub async fn handle_webhook(&self, bot_id: &str, body: &[u8]) -> Result<(), WebhookError> {
        let update: Update = serde_json::from_slice(body)?;
        let instance = self
            .get_instance(bot_id)
            .await?
            .ok_or_else(|| WebhookError::BotNotFound(bot_id.to_string()))?;
        instance.handle_update(&update).await;
        Ok(())
    }
}
