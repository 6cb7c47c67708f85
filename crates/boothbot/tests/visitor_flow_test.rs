//! Visitor registration through the webhook entry point

#![allow(clippy::unwrap_used)]

mod common;

use pretty_assertions::assert_eq;

use boothbot::flow::visitor::{ALREADY_REGISTERED_TEXT, SESSION_LOST_TEXT, THANK_YOU_TEXT, WELCOME_TEXT};
use boothcore::repository::{EventRepository, VisitorRepository};
use boothcore::session::{ConversationState, Session};
use boothcore::types::NewEvent;

use common::{callback_update, text_update, TestEnv};

const OWNER: i64 = 1_000;
const VISITOR: i64 = 42;

#[tokio::test]
async fn test_primary_path_saves_exactly_one_visitor() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    assert_eq!(env.messenger.texts_to(VISITOR), vec![WELCOME_TEXT.to_string()]);
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingName);

    env.send(&bot.id, text_update(VISITOR, "Ada Lovelace")).await;
    let prompt = env.messenger.last_text_to(VISITOR).unwrap();
    assert!(prompt.text.contains("Nice to meet you, <b>Ada Lovelace</b>"));
    assert_eq!(prompt.keyboard.unwrap().callback_data(), vec!["skip_company"]);

    env.send(&bot.id, callback_update(VISITOR, "skip_company")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingTitle);

    env.send(&bot.id, text_update(VISITOR, "Founder")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingEmail);

    env.send(&bot.id, text_update(VISITOR, "ada@example.com")).await;
    assert_eq!(env.messenger.last_text_to(VISITOR).unwrap().text, THANK_YOU_TEXT);

    let visitors = env.repo.list_visitors_for_bot(&bot.id).await.unwrap();
    assert_eq!(visitors.len(), 1);
    let visitor = &visitors[0];
    assert_eq!(visitor.telegram_id, VISITOR);
    assert_eq!(visitor.full_name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(visitor.company, None);
    assert_eq!(visitor.title.as_deref(), Some("Founder"));
    assert_eq!(visitor.email.as_deref(), Some("ada@example.com"));
    assert_eq!(visitor.source.as_deref(), Some("direct"));
    assert_eq!(visitor.event_id, None);

    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.state, ConversationState::Idle);
    assert!(session.visitor_data.is_empty());
}

#[tokio::test]
async fn test_retried_terminal_message_does_not_duplicate() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    for text in ["/start", "Grace", "Navy", "Admiral"] {
        env.send(&bot.id, text_update(VISITOR, text)).await;
    }
    let email = text_update(VISITOR, "grace@example.com");
    env.send(&bot.id, email.clone()).await;
    env.send(&bot.id, email).await;

    assert_eq!(env.repo.count_visitors_for_bot(&bot.id).await.unwrap(), 1);
    let thanks = env
        .messenger
        .texts_to(VISITOR)
        .into_iter()
        .filter(|t| t == THANK_YOU_TEXT)
        .count();
    assert_eq!(thanks, 1);
}

#[tokio::test]
async fn test_skip_email_saves_immediately() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    env.send(&bot.id, text_update(VISITOR, "Linus")).await;
    env.send(&bot.id, callback_update(VISITOR, "skip_company")).await;
    env.send(&bot.id, callback_update(VISITOR, "skip_title")).await;
    env.send(&bot.id, callback_update(VISITOR, "skip_email")).await;

    let visitor = env
        .repo
        .find_visitor_by_bot_and_user(&bot.id, VISITOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visitor.full_name.as_deref(), Some("Linus"));
    assert_eq!(visitor.email, None);
}

#[tokio::test]
async fn test_registered_visitor_short_circuits() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    for text in ["/start", "Ada", "Analytical", "Engineer", "ada@example.com"] {
        env.send(&bot.id, text_update(VISITOR, text)).await;
    }
    env.messenger.clear();

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    assert_eq!(env.messenger.texts_to(VISITOR), vec![ALREADY_REGISTERED_TEXT.to_string()]);

    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.state, ConversationState::Idle);
    assert!(session.visitor_data.is_empty());
}

#[tokio::test]
async fn test_invalid_email_reprompts_then_saves() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    for text in ["/start", "Ada", "Analytical", "Engineer"] {
        env.send(&bot.id, text_update(VISITOR, text)).await;
    }

    env.send(&bot.id, text_update(VISITOR, "not-an-email")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingEmail);
    assert!(env
        .messenger
        .last_text_to(VISITOR)
        .unwrap()
        .text
        .starts_with("That doesn't look like a valid email"));
    assert_eq!(env.repo.count_visitors_for_bot(&bot.id).await.unwrap(), 0);

    env.send(&bot.id, text_update(VISITOR, "ada@example.com")).await;
    assert_eq!(env.repo.count_visitors_for_bot(&bot.id).await.unwrap(), 1);
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::Idle);
}

#[tokio::test]
async fn test_empty_name_is_rejected() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    env.send(&bot.id, text_update(VISITOR, "   ")).await;

    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.state, ConversationState::CollectingName);
    assert_eq!(session.visitor_data.full_name, None);
    assert!(env
        .messenger
        .last_text_to(VISITOR)
        .unwrap()
        .text
        .starts_with("Please enter your name."));
}

#[tokio::test]
async fn test_event_slug_attaches_event() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;
    let event = env
        .repo
        .create_event(NewEvent {
            bot_id: bot.id.clone(),
            name: "My Slug Conf".into(),
            slug: Some("myslug".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    env.send(&bot.id, text_update(VISITOR, "/start myslug")).await;
    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.event_id.as_deref(), Some(event.id.as_str()));
    assert_eq!(session.source.as_deref(), Some("event:myslug"));

    for text in ["Ada", "Analytical", "Engineer", "ada@example.com"] {
        env.send(&bot.id, text_update(VISITOR, text)).await;
    }
    let visitor = env
        .repo
        .find_visitor_by_bot_and_user(&bot.id, VISITOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visitor.event_id.as_deref(), Some(event.id.as_str()));
    assert_eq!(visitor.source.as_deref(), Some("event:myslug"));
    assert_eq!(env.repo.count_visitors_for_event(&event.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_slug_proceeds_without_event() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start unknownslug")).await;

    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.event_id, None);
    assert_eq!(session.source, None);
    assert_eq!(session.state, ConversationState::CollectingName);
    assert_eq!(env.messenger.texts_to(VISITOR), vec![WELCOME_TEXT.to_string()]);
}

#[tokio::test]
async fn test_stale_callback_is_silent() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    env.messenger.clear();

    // A skip for a step the visitor hasn't reached does nothing
    env.send(&bot.id, callback_update(VISITOR, "skip_title")).await;
    assert!(env.messenger.sent_to(VISITOR).is_empty());
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingName);
}

#[tokio::test]
async fn test_lost_visitor_data_asks_to_restart() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    let session = Session {
        state: ConversationState::CollectingEmail,
        ..Default::default()
    };
    env.services.sessions.set(&bot.id, VISITOR, session).await;

    env.send(&bot.id, text_update(VISITOR, "ada@example.com")).await;

    assert_eq!(env.messenger.last_text_to(VISITOR).unwrap().text, SESSION_LOST_TEXT);
    assert_eq!(env.repo.count_visitors_for_bot(&bot.id).await.unwrap(), 0);
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::Idle);
}

const PHONE: &str = "+1 555 123 4567";
const WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

/// `/start`, a name, then straight to the summary
async fn name_then_summary(env: &TestEnv, bot_id: &str) {
    env.send(bot_id, text_update(VISITOR, "/start")).await;
    env.send(bot_id, text_update(VISITOR, "Ada")).await;
    assert_eq!(env.session(bot_id, VISITOR).await.state, ConversationState::CollectingCompany);

    env.send(bot_id, callback_update(VISITOR, "back_to_confirm")).await;
    assert_eq!(env.session(bot_id, VISITOR).await.state, ConversationState::Confirming);
    let summary = env.messenger.last_text_to(VISITOR).unwrap();
    assert!(summary.text.contains("<b>Name:</b> Ada"));
    assert!(summary.text.contains("<b>Company:</b> Not provided"));
}

#[tokio::test]
async fn test_back_to_confirm_needs_a_name() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;

    env.send(&bot.id, text_update(VISITOR, "/start")).await;
    env.send(&bot.id, callback_update(VISITOR, "back_to_confirm")).await;

    assert_eq!(env.messenger.texts_to(VISITOR).len(), 1);
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingName);
}

#[tokio::test]
async fn test_optional_details_run_forward_to_summary() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;
    name_then_summary(&env, &bot.id).await;

    env.send(&bot.id, callback_update(VISITOR, "edit_registration")).await;
    let menu = env.messenger.last_text_to(VISITOR).unwrap();
    assert!(menu.keyboard.unwrap().callback_data().contains(&"edit_phone"));

    env.send(&bot.id, callback_update(VISITOR, "edit_phone")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingPhone);

    env.send(&bot.id, text_update(VISITOR, "12")).await;
    assert_eq!(
        env.messenger.last_text_to(VISITOR).unwrap().text,
        "Please provide a valid phone number."
    );
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingPhone);

    env.send(&bot.id, text_update(VISITOR, PHONE)).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingWallet);
    let prompt = env.messenger.last_text_to(VISITOR).unwrap();
    assert_eq!(prompt.text, "What's your wallet address? (Ethereum or Solana)");
    assert_eq!(prompt.keyboard.unwrap().callback_data(), vec!["skip_wallet"]);

    env.send(&bot.id, text_update(VISITOR, "not-a-wallet")).await;
    assert_eq!(
        env.messenger.last_text_to(VISITOR).unwrap().text,
        "Please provide a valid Ethereum or Solana wallet address."
    );
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingWallet);

    env.send(&bot.id, text_update(VISITOR, WALLET)).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingNotes);

    env.send(&bot.id, text_update(VISITOR, "Interested in staking")).await;
    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.state, ConversationState::Confirming);
    assert_eq!(session.editing, None);
    let summary = env.messenger.last_text_to(VISITOR).unwrap();
    assert!(summary.text.contains(&format!("<b>Phone:</b> {}", PHONE)));
    assert!(summary.text.contains(&format!("<b>Wallet:</b> {}", WALLET)));
    assert!(summary.text.contains("<b>Notes:</b> Interested in staking"));
    assert_eq!(
        summary.keyboard.unwrap().callback_data(),
        vec!["confirm_registration", "edit_registration"]
    );

    env.send(&bot.id, callback_update(VISITOR, "confirm_registration")).await;
    assert_eq!(env.messenger.last_text_to(VISITOR).unwrap().text, THANK_YOU_TEXT);
    let visitor = env
        .repo
        .find_visitor_by_bot_and_user(&bot.id, VISITOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visitor.full_name.as_deref(), Some("Ada"));
    assert_eq!(visitor.company, None);
    assert_eq!(visitor.phone.as_deref(), Some(PHONE));
    assert_eq!(visitor.wallet_address.as_deref(), Some(WALLET));
    assert_eq!(visitor.notes.as_deref(), Some("Interested in staking"));
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::Idle);
}

#[tokio::test]
async fn test_skipped_optional_details_reach_summary() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;
    name_then_summary(&env, &bot.id).await;

    env.send(&bot.id, callback_update(VISITOR, "edit_registration")).await;
    env.send(&bot.id, callback_update(VISITOR, "edit_phone")).await;
    env.send(&bot.id, callback_update(VISITOR, "skip_phone")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingWallet);

    env.send(&bot.id, callback_update(VISITOR, "skip_wallet")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingNotes);

    env.send(&bot.id, callback_update(VISITOR, "skip_notes")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::Confirming);
    let summary = env.messenger.last_text_to(VISITOR).unwrap().text;
    assert!(summary.starts_with("✅ <b>Please confirm your details:</b>"));
    assert!(!summary.contains("<b>Phone:</b>"));
    assert!(!summary.contains("<b>Wallet:</b>"));

    // A repeated skip for a step already passed changes nothing
    let sent = env.messenger.texts_to(VISITOR).len();
    env.send(&bot.id, callback_update(VISITOR, "skip_notes")).await;
    assert_eq!(env.messenger.texts_to(VISITOR).len(), sent);
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::Confirming);

    env.send(&bot.id, callback_update(VISITOR, "confirm_registration")).await;
    let visitor = env
        .repo
        .find_visitor_by_bot_and_user(&bot.id, VISITOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visitor.phone, None);
    assert_eq!(visitor.wallet_address, None);
    assert_eq!(visitor.notes, None);
}

#[tokio::test]
async fn test_primary_field_edit_returns_to_summary() {
    let env = TestEnv::new();
    let bot = env.seed_bot(OWNER).await;
    name_then_summary(&env, &bot.id).await;

    env.send(&bot.id, callback_update(VISITOR, "edit_registration")).await;
    env.send(&bot.id, callback_update(VISITOR, "edit_email")).await;
    assert_eq!(env.session(&bot.id, VISITOR).await.state, ConversationState::CollectingEmail);

    env.send(&bot.id, text_update(VISITOR, "not-an-email")).await;
    assert!(env
        .messenger
        .last_text_to(VISITOR)
        .unwrap()
        .text
        .starts_with("That doesn't look like a valid email."));

    env.send(&bot.id, text_update(VISITOR, "ada@example.com")).await;
    let session = env.session(&bot.id, VISITOR).await;
    assert_eq!(session.state, ConversationState::Confirming);
    assert_eq!(session.editing, None);
    assert!(env
        .messenger
        .last_text_to(VISITOR)
        .unwrap()
        .text
        .contains("<b>Email:</b> ada@example.com"));
    assert_eq!(env.repo.count_visitors_for_bot(&bot.id).await.unwrap(), 0);

    env.send(&bot.id, callback_update(VISITOR, "confirm_registration")).await;
    let visitor = env
        .repo
        .find_visitor_by_bot_and_user(&bot.id, VISITOR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visitor.email.as_deref(), Some("ada@example.com"));
}
