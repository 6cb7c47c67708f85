//! Master bot onboarding and login approval

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use teloxide::types::Update;

use boothbot::masterbot::MasterBot;
use boothcore::auth::{JwtIssuer, LoginCheck, LoginCodeService};
use boothcore::repository::{BotRepository, BugReportRepository, TenantRepository};

use common::fixtures::fresh_token;
use common::{callback_update, text_update, RecordingMessenger, TestEnv};

const ORGANIZER: i64 = 3_000;
const BASE_URL: &str = "https://booth.example.com";

struct Master {
    env: TestEnv,
    messenger: Arc<RecordingMessenger>,
    login: Arc<LoginCodeService>,
    bot: MasterBot,
}

impl Master {
    fn new() -> Self {
        let env = TestEnv::new();
        let messenger = Arc::new(RecordingMessenger::new());
        let login = Arc::new(LoginCodeService::new(
            env.repo.clone(),
            Arc::new(JwtIssuer::new("test-secret")),
            "BoothMasterBot",
        ));
        let bot = MasterBot::new(
            messenger.clone(),
            env.repo.clone(),
            env.registry.clone(),
            Some(login.clone()),
            Some(BASE_URL.to_string()),
        );
        Self {
            env,
            messenger,
            login,
            bot,
        }
    }

    async fn send(&self, body: Vec<u8>) {
        let update: Update = serde_json::from_slice(&body).unwrap();
        self.bot.handle_update(&update).await;
    }

    fn last_text(&self) -> String {
        self.messenger.last_text_to(ORGANIZER).unwrap().text
    }
}

#[tokio::test]
async fn test_start_greets_new_and_returning_organizers() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, "/start")).await;
    assert!(master.last_text().starts_with("🎪 <b>Welcome to BoothBot!</b>"));

    master.send(text_update(ORGANIZER, "/mybots")).await;
    assert_eq!(master.last_text(), "You don't have any bots yet. Use /newbot to create one!");
}

#[tokio::test]
async fn test_newbot_connects_and_registers_bot() {
    let master = Master::new();
    let env = &master.env;

    master.send(text_update(ORGANIZER, "/newbot")).await;
    assert!(master.last_text().contains("Waiting for your bot token"));

    master.send(text_update(ORGANIZER, "not-a-token")).await;
    assert!(master.last_text().starts_with("❌ That doesn't look like a valid bot token."));

    let token = fresh_token();
    master.send(text_update(ORGANIZER, &token)).await;
    assert!(master.last_text().contains("Your booth bot @BoothTestBot is ready!"));

    let record = env.repo.find_bot_by_token(&token).await.unwrap().unwrap();
    assert_eq!(record.owner_telegram_id, Some(ORGANIZER));
    assert_eq!(record.username, "BoothTestBot");
    let tenant = env.repo.find_tenant_by_telegram_id(ORGANIZER).await.unwrap().unwrap();
    assert_eq!(record.tenant_id, tenant.id);

    assert_eq!(
        env.messenger.webhooks(),
        vec![format!("{}/webhook/{}", BASE_URL, record.id)]
    );
    assert!(env.messenger.commands().contains(&"start".to_string()));
    assert!(env.messenger.commands().contains(&"broadcast".to_string()));

    // Installed directly, so the first delivery needs no second connect
    assert_eq!(env.factory.connect_count(), 1);
    assert_eq!(env.registry.len(), 1);
    env.send(&record.id, text_update(ORGANIZER, "/admin")).await;
    assert_eq!(env.factory.connect_count(), 1);
    assert!(env
        .messenger
        .last_text_to(ORGANIZER)
        .unwrap()
        .text
        .starts_with("🔧 <b>Admin Commands</b>"));

    master.send(text_update(ORGANIZER, "/start")).await;
    assert!(master.last_text().contains("You have 1 booth bot(s) set up."));
    master.send(text_update(ORGANIZER, "/mybots")).await;
    assert!(master.last_text().contains("1. @BoothTestBot"));
}

#[tokio::test]
async fn test_same_token_is_not_connected_twice() {
    let master = Master::new();
    let token = fresh_token();

    for _ in 0..2 {
        master.send(text_update(ORGANIZER, "/newbot")).await;
        master.send(text_update(ORGANIZER, &token)).await;
    }

    assert!(master.last_text().starts_with("This bot is already connected."));
    assert_eq!(master.env.factory.connect_count(), 1);
}

#[tokio::test]
async fn test_rejected_token_reports_setup_failure() {
    let master = Master::new();
    master.env.factory.reject.store(true, Ordering::SeqCst);

    master.send(text_update(ORGANIZER, "/newbot")).await;
    let token = fresh_token();
    master.send(text_update(ORGANIZER, &token)).await;

    assert!(master.last_text().starts_with("❌ <b>Setup failed</b>"));
    assert!(master.env.repo.find_bot_by_token(&token).await.unwrap().is_none());
    assert!(master.env.registry.is_empty());
}

#[tokio::test]
async fn test_text_without_newbot_is_ignored() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, &fresh_token())).await;

    assert!(master.messenger.sent().is_empty());
    assert_eq!(master.env.factory.connect_count(), 0);
}

#[tokio::test]
async fn test_abandoned_newbot_stops_waiting_for_token() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, "/newbot")).await;
    master.send(text_update(ORGANIZER, "/help")).await;
    let sent = master.messenger.sent().len();

    master.send(text_update(ORGANIZER, &fresh_token())).await;

    assert_eq!(master.messenger.sent().len(), sent);
    assert_eq!(master.env.factory.connect_count(), 0);
    assert!(master.env.registry.is_empty());
}

#[tokio::test]
async fn test_bug_report_asks_for_details() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, "/bug")).await;
    assert!(master.last_text().starts_with("🐛 <b>Report a Bug</b>"));

    master.send(text_update(ORGANIZER, "bad")).await;
    assert_eq!(
        master.last_text(),
        "Please provide a more detailed description (at least 5 characters)."
    );
    assert!(master.env.repo.list_bug_reports().await.unwrap().is_empty());

    master.send(text_update(ORGANIZER, "  Export hangs on large events  ")).await;
    assert!(master.last_text().starts_with("✅ <b>Bug Report Submitted</b>"));

    let reports = master.env.repo.list_bug_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].telegram_id, ORGANIZER);
    assert_eq!(reports[0].username.as_deref(), Some("user3000"));
    assert_eq!(reports[0].report, "Export hangs on large events");

    // The step is over, so further text is not another report
    let sent = master.messenger.sent().len();
    master.send(text_update(ORGANIZER, "one more thing")).await;
    assert_eq!(master.messenger.sent().len(), sent);
    assert_eq!(master.env.repo.list_bug_reports().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_inline_bug_report_is_stored_directly() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, "/bug QR code image is blank")).await;

    assert!(master.last_text().starts_with("✅ <b>Bug Report Submitted</b>"));
    let reports = master.env.repo.list_bug_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report, "QR code image is blank");
}

#[tokio::test]
async fn test_command_during_bug_report_cancels_it() {
    let master = Master::new();

    master.send(text_update(ORGANIZER, "/bug")).await;
    master.send(text_update(ORGANIZER, "/mybots")).await;
    master.send(text_update(ORGANIZER, "this is not a report")).await;

    assert_eq!(master.last_text(), "You don't have any bots yet. Use /newbot to create one!");
    assert!(master.env.repo.list_bug_reports().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_login_link_approve() {
    let master = Master::new();
    let init = master.login.init().await.unwrap();

    master.send(text_update(ORGANIZER, &format!("/start login_{}", init.code))).await;
    let prompt = master.messenger.last_text_to(ORGANIZER).unwrap();
    assert!(prompt.text.contains("Dashboard login requested"));
    let approve = format!("login_approve:{}", init.code);
    let deny = format!("login_deny:{}", init.code);
    assert_eq!(
        prompt.keyboard.unwrap().callback_data(),
        vec![approve.as_str(), deny.as_str()]
    );

    master.send(callback_update(ORGANIZER, &approve)).await;
    assert!(master.last_text().starts_with("✅ Login approved!"));

    match master.login.check(&init.code).await.unwrap() {
        LoginCheck::Approved { tenant, .. } => assert_eq!(tenant.telegram_id, Some(ORGANIZER)),
        other => panic!("expected approval, got {:?}", other),
    }

    // A resolved code can't be decided again
    master.send(callback_update(ORGANIZER, &deny)).await;
    assert!(master.last_text().starts_with("❌ This login link is invalid"));
}

#[tokio::test]
async fn test_login_link_deny() {
    let master = Master::new();
    let init = master.login.init().await.unwrap();

    master
        .send(callback_update(ORGANIZER, &format!("login_deny:{}", init.code)))
        .await;

    assert!(master.last_text().starts_with("🚫 Login denied."));
    assert_eq!(master.login.check(&init.code).await.unwrap(), LoginCheck::Denied);
}
