//! The flattened prompt format.
//!
//! One single string carries an entire structured conversation to a
//! completion-style backend:
//!
//! ```text
//! <|start_header_id|>system<|end_header_id|>\n\n{system}<|eot_id|>
//! <|start_header_id|>user<|end_header_id|>\n\n{turn.user}<|eot_id|>
//! <|start_header_id|>assistant<|end_header_id|>\n\n{turn.assistant}<|eot_id|>
//! ...
//! <|start_header_id|>user<|end_header_id|>\n\n{current}<|eot_id|>
//! <|start_header_id|>assistant<|end_header_id|>\n\n
//! ```
//!
//! (shown on separate lines for readability; the real string has no
//! newlines between segments). The trailing assistant header with an empty
//! interior is the generation cursor: the local runtime continues from it,
//! and the remote provider's translator stops scanning when it reaches it.
//!
//! The delimiter tokens are the Llama-3 instruct special-token family.
//! They do not occur in natural text, which is what closes off the
//! "content contains a delimiter" ambiguity — the format does no escaping.
//!
//! Encoder (this module) and decoder (the remote provider's translator)
//! must agree exactly; [`FORMAT_VERSION`] exists so a future third party
//! can detect a mismatch instead of silently mis-parsing.

use crate::conversation::{ConversationTurn, Role};

/// Opens a role header.
pub const ROLE_OPEN: &str = "<|start_header_id|>";
/// Closes a role header.
pub const ROLE_CLOSE: &str = "<|end_header_id|>";
/// Terminates a completed turn.
pub const TURN_END: &str = "<|eot_id|>";

/// Bump when the delimiter scheme or segment order changes.
pub const FORMAT_VERSION: u32 = 1;

/// Render the header that opens a turn for `role`.
pub fn turn_header(role: Role) -> String {
    format!("{ROLE_OPEN}{}{ROLE_CLOSE}\n\n", role.as_str())
}

/// Append one completed turn segment to `out`.
fn push_turn(out: &mut String, role: Role, content: &str) {
    out.push_str(&turn_header(role));
    out.push_str(content);
    out.push_str(TURN_END);
}

/// Flatten a system prompt, history window, and current user message into
/// the single-string prompt format, ending at the generation cursor.
///
/// The caller is responsible for bounding `history`; every turn passed in
/// is encoded.
pub fn flatten(system: &str, history: &[ConversationTurn], user_message: &str) -> String {
    let mut out = String::with_capacity(
        system.len()
            + history
                .iter()
                .map(|t| t.user.len() + t.assistant.len() + 96)
                .sum::<usize>()
            + user_message.len()
            + 128,
    );

    push_turn(&mut out, Role::System, system);
    for turn in history {
        push_turn(&mut out, Role::User, &turn.user);
        push_turn(&mut out, Role::Assistant, &turn.assistant);
    }
    push_turn(&mut out, Role::User, user_message);

    // Generation cursor: open assistant turn, no content, no terminator.
    out.push_str(&turn_header(Role::Assistant));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_shape() {
        assert_eq!(
            turn_header(Role::User),
            "<|start_header_id|>user<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn flatten_ends_at_generation_cursor() {
        let prompt = flatten("Be brief.", &[], "Hello");
        assert!(prompt.ends_with(&turn_header(Role::Assistant)));
        assert!(!prompt.ends_with(TURN_END));
    }

    #[test]
    fn flatten_orders_segments() {
        let history = vec![ConversationTurn::new("Hi", "Hello!")];
        let prompt = flatten("Be brief.", &history, "What do you do?");

        let sys = prompt.find("Be brief.").unwrap();
        let u1 = prompt.find("Hi").unwrap();
        let a1 = prompt.find("Hello!").unwrap();
        let u2 = prompt.find("What do you do?").unwrap();
        assert!(sys < u1 && u1 < a1 && a1 < u2);
    }

    #[test]
    fn flatten_terminates_every_completed_turn() {
        let history = vec![
            ConversationTurn::new("a", "b"),
            ConversationTurn::new("c", "d"),
        ];
        let prompt = flatten("sys", &history, "e");
        // system + 2 history turns * 2 + current user = 6 terminators
        assert_eq!(prompt.matches(TURN_END).count(), 6);
    }

    #[test]
    fn flatten_with_empty_history() {
        let prompt = flatten("sys", &[], "question");
        assert_eq!(prompt.matches(&turn_header(Role::User)).count(), 1);
        assert_eq!(prompt.matches(&turn_header(Role::Assistant)).count(), 1);
    }
}
