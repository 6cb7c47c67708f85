//! Dashboard authentication: deep-link login codes, Telegram login widget
//! verification and token issuance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config;
use crate::error::{AppError, AppResult};
use crate::qr::deep_link;
use crate::repository::Repository;
use crate::types::{AuthCode, AuthCodeStatus, NewTenant, TelegramId, Tenant};

type HmacSha256 = Hmac<Sha256>;

/// Who a dashboard token speaks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: String,
    pub email: String,
}

impl Principal {
    /// Tenants created through Telegram have no email; they get a stable
    /// placeholder derived from their Telegram id.
    pub fn for_tenant(tenant: &Tenant) -> Self {
        let email = tenant.email.clone().unwrap_or_else(|| match tenant.telegram_id {
            Some(id) => format!("tg_{}@telegram.user", id),
            None => format!("{}@tenant.local", tenant.id),
        });
        Self {
            tenant_id: tenant.id.clone(),
            email,
        }
    }
}

/// Issues and verifies opaque bearer tokens
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, principal: &Principal) -> AppResult<String>;
    fn verify(&self, token: &str) -> AppResult<Principal>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWTs
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtIssuer {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, chrono::Duration::days(config::auth::TOKEN_TTL_DAYS))
    }

    pub fn with_ttl(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, principal: &Principal) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.tenant_id.clone(),
            email: principal.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> AppResult<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(Principal {
            tenant_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}

/// Payload posted by the Telegram login widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAuthData {
    pub id: TelegramId,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub auth_date: i64,
    pub hash: String,
}

impl TelegramAuthData {
    /// `key=value` lines of every present field except `hash`, sorted by key
    fn data_check_string(&self) -> String {
        let mut pairs = vec![
            ("auth_date", self.auth_date.to_string()),
            ("first_name", self.first_name.clone()),
            ("id", self.id.to_string()),
        ];
        for (key, value) in [
            ("last_name", &self.last_name),
            ("photo_url", &self.photo_url),
            ("username", &self.username),
        ] {
            if let Some(value) = value {
                pairs.push((key, value.clone()));
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn widget_mac(data: &TelegramAuthData, bot_token: &str) -> AppResult<HmacSha256> {
    let secret = Sha256::digest(bot_token.as_bytes());
    let mut mac = HmacSha256::new_from_slice(&secret).map_err(|e| AppError::Validation(e.to_string()))?;
    mac.update(data.data_check_string().as_bytes());
    Ok(mac)
}

/// Hex signature the widget would attach to `data` for `bot_token`
pub fn sign_telegram_auth(data: &TelegramAuthData, bot_token: &str) -> AppResult<String> {
    Ok(hex::encode(widget_mac(data, bot_token)?.finalize().into_bytes()))
}

/// Validates a login widget payload: HMAC-SHA256 keyed by SHA-256 of the
/// bot token, and an `auth_date` no older than a day.
pub fn verify_telegram_auth(data: &TelegramAuthData, bot_token: &str, now: DateTime<Utc>) -> AppResult<()> {
    let received = hex::decode(&data.hash).map_err(|_| AppError::Validation("malformed hash".into()))?;
    widget_mac(data, bot_token)?
        .verify_slice(&received)
        .map_err(|_| AppError::Validation("invalid Telegram authentication".into()))?;

    let age = now.timestamp() - data.auth_date;
    if age > config::auth::TELEGRAM_AUTH_MAX_AGE_SECS {
        return Err(AppError::Validation(format!("auth data is too old ({} seconds)", age)));
    }
    Ok(())
}

/// Response to a login-code request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInit {
    pub code: String,
    pub deep_link: String,
    pub expires_in: u64,
}

/// Result of polling a login code
#[derive(Debug, Clone, PartialEq)]
pub enum LoginCheck {
    Pending,
    Approved { token: String, tenant: Tenant },
    Denied,
    Expired,
    NotFound,
}

/// Telegram identity approving or denying a login
#[derive(Debug, Clone, Default)]
pub struct TelegramIdentity {
    pub telegram_id: TelegramId,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Deep-link login: the dashboard asks for a code, the user opens
/// `t.me/<master>?start=login_<code>`, the master bot approves it and the
/// dashboard's next poll exchanges the code for a token.
pub struct LoginCodeService {
    repo: Arc<dyn Repository>,
    issuer: Arc<dyn TokenIssuer>,
    bot_username: String,
    ttl: Duration,
}

impl LoginCodeService {
    pub fn new(repo: Arc<dyn Repository>, issuer: Arc<dyn TokenIssuer>, bot_username: impl Into<String>) -> Self {
        Self {
            repo,
            issuer,
            bot_username: bot_username.into(),
            ttl: config::auth::login_code_ttl(),
        }
    }

    pub fn issuer(&self) -> &Arc<dyn TokenIssuer> {
        &self.issuer
    }

    pub async fn init(&self) -> AppResult<LoginInit> {
        let code = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).map_err(|e| AppError::Validation(e.to_string()))?;

        self.repo
            .create_auth_code(AuthCode {
                code: code.clone(),
                status: AuthCodeStatus::Pending,
                telegram_id: None,
                telegram_username: None,
                first_name: None,
                created_at: now,
                expires_at: now + ttl,
            })
            .await?;

        let payload = format!("{}{}", config::auth::LOGIN_PAYLOAD_PREFIX, code);
        Ok(LoginInit {
            deep_link: deep_link(&self.bot_username, &payload),
            code,
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Polls a code. An approved code is consumed: it is exchanged for a
    /// token exactly once and then deleted.
    pub async fn check(&self, code: &str) -> AppResult<LoginCheck> {
        let Some(auth) = self.repo.find_auth_code(code).await? else {
            return Ok(LoginCheck::NotFound);
        };

        if auth.is_expired(Utc::now()) {
            self.repo.delete_auth_code(code).await?;
            return Ok(LoginCheck::Expired);
        }

        match auth.status {
            AuthCodeStatus::Pending => Ok(LoginCheck::Pending),
            AuthCodeStatus::Denied => Ok(LoginCheck::Denied),
            AuthCodeStatus::Approved => {
                let telegram_id = auth
                    .telegram_id
                    .ok_or_else(|| AppError::Validation("approved code without Telegram id".into()))?;
                let tenant = find_or_create_tenant(
                    self.repo.as_ref(),
                    TelegramIdentity {
                        telegram_id,
                        username: auth.telegram_username,
                        first_name: auth.first_name,
                    },
                )
                .await?;
                let token = self.issuer.issue(&Principal::for_tenant(&tenant))?;
                self.repo.delete_auth_code(code).await?;
                tracing::info!(tenant_id = %tenant.id, "Login code exchanged");
                Ok(LoginCheck::Approved { token, tenant })
            }
        }
    }

    /// Approves a pending, unexpired code on behalf of `who`
    pub async fn approve(&self, code: &str, who: TelegramIdentity) -> AppResult<bool> {
        self.resolve(code, AuthCodeStatus::Approved, who).await
    }

    pub async fn deny(&self, code: &str, who: TelegramIdentity) -> AppResult<bool> {
        self.resolve(code, AuthCodeStatus::Denied, who).await
    }

    async fn resolve(&self, code: &str, status: AuthCodeStatus, who: TelegramIdentity) -> AppResult<bool> {
        match self.repo.find_auth_code(code).await? {
            Some(auth) if auth.status == AuthCodeStatus::Pending && !auth.is_expired(Utc::now()) => {
                self.repo
                    .resolve_auth_code(code, status, who.telegram_id, who.username, who.first_name)
                    .await
            }
            _ => Ok(false),
        }
    }

    /// Signs a tenant in with a Telegram login widget payload
    pub async fn login_with_widget(&self, data: &TelegramAuthData, bot_token: &str) -> AppResult<(String, Tenant)> {
        verify_telegram_auth(data, bot_token, Utc::now())?;
        let tenant = find_or_create_tenant(
            self.repo.as_ref(),
            TelegramIdentity {
                telegram_id: data.id,
                username: data.username.clone(),
                first_name: Some(data.first_name.clone()),
            },
        )
        .await?;
        let token = self.issuer.issue(&Principal::for_tenant(&tenant))?;
        Ok((token, tenant))
    }
}

/// Looks a tenant up by Telegram id, creating it on first contact
pub async fn find_or_create_tenant(repo: &dyn Repository, who: TelegramIdentity) -> AppResult<Tenant> {
    if let Some(tenant) = repo.find_tenant_by_telegram_id(who.telegram_id).await? {
        return Ok(tenant);
    }
    let tenant = repo
        .create_tenant(NewTenant {
            email: None,
            telegram_id: Some(who.telegram_id),
            first_name: who.first_name,
            username: who.username,
        })
        .await?;
    tracing::info!(tenant_id = %tenant.id, telegram_id = who.telegram_id, "Created tenant");
    Ok(tenant)
}
