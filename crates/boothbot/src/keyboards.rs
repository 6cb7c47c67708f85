use boothcore::session::Field;

use crate::messenger::{Button, Keyboard};

pub const REGISTER_VISITOR: &str = "register_visitor";
pub const CONFIRM_REGISTRATION: &str = "confirm_registration";
pub const EDIT_REGISTRATION: &str = "edit_registration";
pub const BACK_TO_CONFIRM: &str = "back_to_confirm";
pub const SKIP_PREFIX: &str = "skip_";
pub const EDIT_PREFIX: &str = "edit_";

pub fn start_keyboard() -> Keyboard {
    Keyboard::default().row(vec![Button::new("Register as Visitor", REGISTER_VISITOR)])
}

/// Single `Skip` button for an optional field
pub fn skip_keyboard(field: Field) -> Keyboard {
    Keyboard::default().row(vec![Button::new("Skip", format!("{}{}", SKIP_PREFIX, field))])
}

pub fn confirm_keyboard() -> Keyboard {
    Keyboard::default().row(vec![
        Button::new("Confirm", CONFIRM_REGISTRATION),
        Button::new("Edit", EDIT_REGISTRATION),
    ])
}

pub fn edit_fields_keyboard() -> Keyboard {
    let fields = [
        (Field::FullName, "Edit Name"),
        (Field::Company, "Edit Company"),
        (Field::Title, "Edit Role"),
        (Field::Email, "Edit Email"),
        (Field::Phone, "Edit Phone"),
        (Field::WalletAddress, "Edit Wallet"),
        (Field::Notes, "Edit Notes"),
    ];

    let keyboard = fields.iter().fold(Keyboard::default(), |kb, (field, label)| {
        kb.row(vec![Button::new(*label, format!("{}{}", EDIT_PREFIX, field))])
    });
    keyboard.row(vec![Button::new("← Back", BACK_TO_CONFIRM)])
}
