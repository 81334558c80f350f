//! User-facing texts.

use storage::Customer;

use crate::formatting::escape_html;
use crate::state::ContactField;
use crate::validator::ValidationCode;

pub const WELCOME: &str =
    "Hello! Before we start, we need a few details so our team can help you faster.";
pub const START: &str = "Hello! Write your question here and our team will answer shortly.";
pub const ASK_FULL_NAME: &str = "Please enter your full name.";
pub const ASK_PHONE: &str =
    "Please send your phone number in international format or tap \"Share phone\".";
pub const ASK_EMAIL: &str = "Please enter your email address.";
pub const REGISTRATION_COMPLETE: &str =
    "Thank you, registration is complete. Write your question and we will reply here.";
pub const FULL_NAME_TRUNCATED: &str = "Your name was too long and has been shortened.";
pub const SAVE_FAILED: &str = "Something went wrong while saving your data. Please try again.";
pub const EDIT_SUCCESS: &str = "Your data has been updated.";
pub const EDIT_CANCELLED: &str = "Editing cancelled.";
pub const NOTHING_TO_CANCEL: &str = "There is nothing to cancel.";
pub const SHARE_PHONE_PROMPT: &str = "Tap the button below to share your phone number.";
pub const SHARE_PHONE_BUTTON: &str = "Share phone";
pub const REQUEST_PHONE_FROM_GROUP: &str =
    "Our manager asks for your phone number. Tap the button below to share it.";
pub const BANNED: &str = "You have been blocked by the support team.";
pub const TOPIC_CLOSED: &str =
    "Your request has been closed. Write to us again if you have more questions.";
pub const PHONE_REQUEST_SENT: &str = "Phone number request sent to the customer.";
pub const RENAME_USAGE: &str = "Usage: /rename_topic <new name>";
pub const RENAME_TOO_LONG: &str = "The topic name is too long.";
pub const TOPIC_NAME_RESTORED: &str = "Topic name restored.";

pub fn ask_for(field: ContactField) -> &'static str {
    match field {
        ContactField::FullName => ASK_FULL_NAME,
        ContactField::Phone => ASK_PHONE,
        ContactField::Email => ASK_EMAIL,
    }
}

pub fn edit_prompt(field: ContactField) -> &'static str {
    match field {
        ContactField::FullName => "Enter your new full name or /cancel.",
        ContactField::Phone => "Send your new phone number or /cancel.",
        ContactField::Email => "Enter your new email address or /cancel.",
    }
}

/// Corrective prompt for a rejected value.
pub fn validation_error(field: ContactField, code: ValidationCode) -> &'static str {
    match (field, code) {
        (ContactField::FullName, ValidationCode::Required) => "Full name is required.",
        (ContactField::FullName, ValidationCode::TooShort) => {
            "Full name must be at least 3 characters long."
        }
        (ContactField::FullName, _) => "Full name is not valid. Please try again.",
        (ContactField::Phone, ValidationCode::Required) => "Phone number is required.",
        (ContactField::Phone, ValidationCode::TooShort) => {
            "The phone number is too short, it must contain 10 to 15 digits."
        }
        (ContactField::Phone, ValidationCode::TooLong) => {
            "The phone number is too long, it must contain 10 to 15 digits."
        }
        (ContactField::Phone, _) => {
            "The phone number is not valid. Use international format, e.g. +375291234567."
        }
        (ContactField::Email, ValidationCode::Required) => "Email is required.",
        (ContactField::Email, _) => "The email address is not valid. Please try again.",
    }
}

/// Stored contact data, HTML.
pub fn my_data(customer: &Customer) -> String {
    let show = |value: Option<&str>| {
        value
            .map(escape_html)
            .unwrap_or_else(|| "not set".to_string())
    };
    format!(
        "<b>Your data</b>\nName: {}\nPhone: {}\nEmail: {}",
        show(customer.full_name()),
        show(customer.phone_number()),
        show(customer.email())
    )
}

pub fn phone_already_known(phone: &str) -> String {
    format!("The customer's phone number is already known: {}", phone)
}

pub fn contact_forwarded(name: &str, phone: &str) -> String {
    format!("Contact:\nName: {}\nPhone: {}", name, phone)
}

pub fn broadcast_queued(recipients: usize) -> String {
    format!("Broadcast queued for {} recipients.", recipients)
}

pub fn rename_too_long(max: usize) -> String {
    format!("{} Maximum is {} characters.", RENAME_TOO_LONG, max)
}
