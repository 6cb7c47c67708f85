//! Raw webhook bodies as Telegram would post them

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicI32, Ordering};

use serde_json::json;

static NEXT_UPDATE_ID: AtomicI32 = AtomicI32::new(1);

fn next_id() -> i32 {
    NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A private-chat text message from `user_id`
pub fn text_update(user_id: i64, text: &str) -> Vec<u8> {
    let id = next_id();
    serde_json::to_vec(&json!({
        "update_id": id,
        "message": {
            "message_id": id,
            "date": 1_700_000_000,
            "chat": {"id": user_id, "type": "private", "first_name": "Visitor"},
            "from": {"id": user_id, "is_bot": false, "first_name": "Visitor", "username": format!("user{}", user_id)},
            "text": text
        }
    }))
    .unwrap()
}

/// An inline-button press by `user_id`
pub fn callback_update(user_id: i64, data: &str) -> Vec<u8> {
    let id = next_id();
    serde_json::to_vec(&json!({
        "update_id": id,
        "callback_query": {
            "id": format!("cb-{}", id),
            "from": {"id": user_id, "is_bot": false, "first_name": "Visitor"},
            "chat_instance": "test",
            "data": data
        }
    }))
    .unwrap()
}
