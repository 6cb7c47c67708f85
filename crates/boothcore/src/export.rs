//! CSV export of captured leads.
//!
//! Column order is fixed; scripts consuming exports rely on it.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{Visitor, DIRECT_SOURCE};

pub const CSV_HEADER: &str =
    "Full Name,Company,Title,Email,Phone,Wallet Address,Telegram Username,Source,Notes,Created At";

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Renders visitors as CSV: header row, then one fully quoted row per lead
pub fn visitors_to_csv(visitors: &[Visitor]) -> String {
    let mut content = String::from(CSV_HEADER);

    for v in visitors {
        let created_at = v.created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let cells = [
            opt(&v.full_name),
            opt(&v.company),
            opt(&v.title),
            opt(&v.email),
            opt(&v.phone),
            opt(&v.wallet_address),
            opt(&v.telegram_username),
            v.source.as_deref().unwrap_or(DIRECT_SOURCE),
            opt(&v.notes),
            created_at.as_str(),
        ];
        content.push('\n');
        content.push_str(&cells.iter().map(|c| quote(c)).collect::<Vec<_>>().join(","));
    }

    content
}

/// Attachment name for a bot's export: `leads_<first 8 of bot id>_<unix ms>.csv`
pub fn export_file_name(bot_id: &str, at: DateTime<Utc>) -> String {
    let short: String = bot_id.chars().take(8).collect();
    format!("leads_{}_{}.csv", short, at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn visitor() -> Visitor {
        Visitor {
            id: "v1".into(),
            bot_id: "bot".into(),
            event_id: None,
            source: None,
            telegram_id: 42,
            telegram_username: Some("ada".into()),
            full_name: Some("Ada \"The Countess\" Lovelace".into()),
            company: Some("Analytical, Ltd".into()),
            title: None,
            email: Some("ada@example.com".into()),
            phone: None,
            wallet_address: None,
            notes: None,
            created_at: Utc.with_ymd_and_hms(2025, 2, 27, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_header_only_when_empty() {
        assert_eq!(visitors_to_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn test_quotes_are_doubled_and_source_defaults() {
        let csv = visitors_to_csv(&[visitor()]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#""Ada ""The Countess"" Lovelace","Analytical, Ltd","","ada@example.com","","","ada","direct","","2025-02-27T10:30:00.000Z""#
        );
    }

    #[test]
    fn test_file_name() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            export_file_name("3f2b1c4d-5e6f-4a7b-8c9d-0e1f2a3b4c5d", at),
            "leads_3f2b1c4d_1700000000123.csv"
        );
    }
}
