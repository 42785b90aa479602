//! Light chat command handling.
//!
//! Commands are bare lowercase words, matched before anything reaches the
//! language model.

use pagebot_memory::ConversationStore;

const HELP_TEXT: &str = "Commands:\n\
    id - show your page-scoped sender id\n\
    reset - clear our conversation memory\n\
    help - show this message\n\
    Anything else is answered by the model.";

/// Handle a chat command, returning the reply when the text is one.
///
/// Returns None for ordinary messages, which then go to the model.
pub async fn handle_chat_command(
    store: &ConversationStore,
    sender_id: &str,
    text: &str,
) -> Option<String> {
    match text.trim().to_lowercase().as_str() {
        "id" => Some(format!("Your PSID is: {sender_id}")),
        "reset" => {
            let removed = store.reset(sender_id).await;
            let reply = if removed {
                "Conversation memory cleared."
            } else {
                "Nothing to clear yet."
            };
            Some(reply.to_string())
        }
        "help" => Some(HELP_TEXT.to_string()),
        _ => None,
    }
}
