//! Flattened-format translator.
//!
//! Reconstructs the ordered role-tagged message list from the flattened
//! prompt string, for backends that want a message array instead of one
//! completion-style string.
//!
//! The scan is a single forward pass with no backtracking:
//!
//! ```text
//! SEEK_SYSTEM → SEEK_USER ⇄ SEEK_ASSISTANT → DONE
//! ```
//!
//! After each user segment, an assistant segment with non-empty interior
//! is a completed turn and scanning continues past it; an assistant
//! marker with an empty interior is the generation cursor and terminates
//! the scan without emitting a trailing assistant message.
//!
//! The input is produced exclusively by the prompt assembler (same
//! [`promptloom_core::prompt::FORMAT_VERSION`]), so malformed delimiters
//! are a programming error upstream, not a condition this module
//! validates against — missing markers simply end the scan early.

use promptloom_core::prompt::{ROLE_CLOSE, ROLE_OPEN, TURN_END};
use promptloom_core::{ChatMessage, Role};

/// The header that opens a turn for `role`, without the interior
/// separator.
fn header(role: Role) -> String {
    format!("{ROLE_OPEN}{}{ROLE_CLOSE}", role.as_str())
}

/// Locate the next segment for `role` in `input`.
///
/// Returns the segment interior plus the remainder after its terminator;
/// the remainder is `None` when no terminator follows (the generation
/// cursor).
fn next_segment(input: &str, role: Role) -> Option<(&str, Option<&str>)> {
    let header = header(role);
    let at = input.find(&header)?;
    let mut body = &input[at + header.len()..];
    if let Some(stripped) = body.strip_prefix("\n\n") {
        body = stripped;
    }
    match body.find(TURN_END) {
        Some(end) => Some((&body[..end], Some(&body[end + TURN_END.len()..]))),
        None => Some((body, None)),
    }
}

/// Translate a flattened prompt back into an ordered message list.
pub fn unflatten(prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    let mut rest = prompt;

    // SEEK_SYSTEM
    match next_segment(rest, Role::System) {
        Some((system, after)) => {
            messages.push(ChatMessage::system(system));
            rest = after.unwrap_or("");
        }
        None => return messages,
    }

    // SEEK_USER ⇄ SEEK_ASSISTANT
    loop {
        let Some((user, after)) = next_segment(rest, Role::User) else {
            break;
        };
        messages.push(ChatMessage::user(user));
        let Some(after) = after else {
            break;
        };
        rest = after;

        match next_segment(rest, Role::Assistant) {
            Some((content, after)) if !content.trim().is_empty() => {
                messages.push(ChatMessage::assistant(content));
                match after {
                    Some(after) => rest = after,
                    None => break,
                }
            }
            // Empty interior: the generation cursor. No marker at all:
            // the prompt is exhausted. Either way the scan is done.
            _ => break,
        }
    }

    messages
}
