//! Input validation and slug helpers used by the conversation flows

use lazy_regex::regex_is_match;

/// Longest slug accepted for an event deep link
pub const MAX_SLUG_LEN: usize = 50;

/// `local@domain.tld` shape, nothing stricter
pub fn is_valid_email(email: &str) -> bool {
    regex_is_match!(r"^[^\s@]+@[^\s@]+\.[^\s@]+$", email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    regex_is_match!(r"^\+?[\d\s\-()]{7,}$", phone)
}

/// Accepts an Ethereum address or a Solana base58 public key
pub fn is_valid_wallet_address(address: &str) -> bool {
    regex_is_match!(r"^0x[a-fA-F0-9]{40}$", address) || regex_is_match!(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$", address)
}

/// Bot API token as issued by BotFather
pub fn is_valid_bot_token(token: &str) -> bool {
    regex_is_match!(r"^\d+:[A-Za-z0-9_-]{35}$", token)
}

/// Canonical hyphenated UUID, the shape of every generated record id
pub fn is_uuid_like(value: &str) -> bool {
    regex_is_match!(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        value
    )
}

/// Derives a deep-link slug from free text.
///
/// Lowercases, maps every run of characters outside `[a-z0-9]` to a single
/// dash, trims dashes at both ends and truncates to [`MAX_SLUG_LEN`].
/// The result may be empty (e.g. for an all-emoji name).
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
    }
    slug.trim_end_matches('-').to_string()
}

/// A slug usable in a deep link: non-empty, slug charset only, and never
/// shaped like a record id so slug and id lookups cannot collide.
pub fn is_acceptable_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && regex_is_match!(r"^[a-z0-9]+(?:-[a-z0-9]+)*$", slug)
        && !is_uuid_like(slug)
}
