//! Command menus shown by Telegram clients.

use desk_telegram::CommandSpec;

/// Private chat menu for customers.
pub fn private_menu() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("start", "Start the conversation"),
        CommandSpec::new("my_data", "Show and edit my contact data"),
        CommandSpec::new("phone", "Share my phone number"),
        CommandSpec::new("edit_name", "Change my name"),
        CommandSpec::new("edit_phone", "Change my phone"),
        CommandSpec::new("edit_email", "Change my email"),
        CommandSpec::new("cancel", "Cancel editing"),
    ]
}

/// Support group menu for managers.
pub fn group_menu() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("contact", "Post the contact card again"),
        CommandSpec::new("request_phone", "Ask the customer for a phone number"),
        CommandSpec::new("rename_topic", "Rename this topic"),
        CommandSpec::new("restore_topic_name", "Restore the generated topic name"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_commands_have_no_slash() {
        for spec in private_menu().iter().chain(group_menu().iter()) {
            assert!(!spec.command.starts_with('/'));
            assert!(!spec.description.is_empty());
        }
    }
}
