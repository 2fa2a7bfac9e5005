//! System prompts and message builders for the agentic loop.
//!
//! Phase one uses the tool-use prompt; phase two rebuilds a fresh message
//! sequence around the synthesis prompt so the model answers from labelled
//! evidence rather than its own tool-call history.

use crate::core::{Attachment, FetchedArticle, ThreadMessage, ThreadRole};

use super::message::{ChatMessage, assistant_message, system_message, user_message};

/// Thread messages included in the phase-one system prompt.
pub const HISTORY_MAX_MESSAGES: usize = 4;
/// Characters kept of each included thread message.
pub const HISTORY_TRUNCATE_CHARS: usize = 300;
/// Characters kept of each attachment.
pub const ATTACHMENT_TRUNCATE_CHARS: usize = 2_000;
/// Recent thread messages carried into the synthesis sequence (the thread
/// parent is always included on top of these).
pub const SYNTHESIS_HISTORY_MESSAGES: usize = 3;

/// Base system prompt for the evidence-gathering phase.
const TOOL_SYSTEM_PROMPT: &str = r#"You are Lightopedia, the internal assistant for the Light finance platform. You answer questions from Light's own team using the help-article knowledge base — never from memory.

## How to work

1. Use `knowledge_base` to see what articles exist when you are unsure.
2. Use `search_articles` and `fetch_articles` to pull the full content of every article you might cite. Only fetched articles can be cited later.
3. If the docs clearly cannot answer the question, use `escalate_to_human` to draft an escalation, then still summarize whatever you did find.
4. Gather evidence first; do not write the final answer until you have fetched the articles that support it.

## Rules

- Evidence is docs-only: no customer data, no code internals, no guessing.
- Prefer fetching one article too many over citing one you never fetched.
- Stay factual about what Light does and does not do."#;

/// System prompt for the clean synthesis phase. No tools are available.
const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are Lightopedia, the internal assistant for the Light finance platform. Write the final answer from the labelled evidence in the user message. Tools are not available in this step; do not request them.

## Answer format

- Start with a one-line direct answer.
- Follow with short bullets covering the relevant details.
- Cite evidence inline as [[n]](url) where n is the evidence number and url is EXACTLY the URL shown in the evidence label. Never cite a URL that is not in the evidence.
- Say plainly *what Light does* and *what Light does not* do — sales conversations depend on that line being crisp.
- Plain-language enablement tone: write for a colleague about to answer a customer, not for an engineer.
- Use *single asterisks* for bold (the chat surface renders those), never double asterisks.

## Banned phrasing

Never over-promise. Do not use: "automatically", "out of the box", "seamlessly", "guaranteed", "zero configuration", "always works", "supports all". Describe the actual behavior and its conditions instead.

If the evidence does not answer the question, say so and point to the closest related capability."#;

/// Builds the phase-one system prompt: base + optional user-context block
/// + truncated thread-history block.
#[must_use]
pub fn tool_system_prompt(user_context: Option<&str>, history: &[ThreadMessage]) -> String {
    let mut prompt = TOOL_SYSTEM_PROMPT.to_string();

    if let Some(context) = user_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\n## Who is asking\n\n");
        prompt.push_str(context.trim());
    }

    if !history.is_empty() {
        prompt.push_str("\n\n## Thread so far\n\n");
        let start = history.len().saturating_sub(HISTORY_MAX_MESSAGES);
        for message in &history[start..] {
            let role = match message.role {
                ThreadRole::User => "user",
                ThreadRole::Assistant => "you",
            };
            prompt.push_str(&format!(
                "- {role}: {}\n",
                truncate_chars(&message.text, HISTORY_TRUNCATE_CHARS)
            ));
        }
    }

    prompt
}

/// Builds the phase-one user message: the question plus truncated
/// attachment text.
#[must_use]
pub fn tool_user_message(question: &str, attachments: &[Attachment]) -> String {
    let mut message = question.to_string();
    for attachment in attachments {
        message.push_str(&format!(
            "\n\nAttached file `{}`:\n{}",
            attachment.name,
            truncate_chars(&attachment.text, ATTACHMENT_TRUNCATE_CHARS)
        ));
    }
    message
}

/// Builds the fresh phase-two message sequence: synthesis prompt,
/// compressed thread history (thread parent plus the most recent
/// messages), and one user message holding the labelled evidence and the
/// original question.
#[must_use]
pub fn synthesis_messages(
    question: &str,
    history: &[ThreadMessage],
    fetched: &[FetchedArticle],
) -> Vec<ChatMessage> {
    let mut messages = vec![system_message(SYNTHESIS_SYSTEM_PROMPT)];

    // Thread parent first, then the recent tail (skipping the parent if
    // it is already inside the tail).
    let tail_start = history.len().saturating_sub(SYNTHESIS_HISTORY_MESSAGES);
    if let Some(parent) = history.first()
        && tail_start > 0
    {
        messages.push(history_message(parent));
    }
    for message in history.get(tail_start..).unwrap_or_default() {
        messages.push(history_message(message));
    }

    let mut user = String::from("Evidence:\n\n");
    for (index, article) in fetched.iter().enumerate() {
        user.push_str(&format!(
            "[{}] {} ({})\n{}\n\n",
            index + 1,
            article.title,
            article.url,
            article.content
        ));
    }
    user.push_str(&format!("Question: {question}"));
    messages.push(user_message(&user));

    messages
}

/// Converts a thread message into a chat message.
fn history_message(message: &ThreadMessage) -> ChatMessage {
    let text = truncate_chars(&message.text, HISTORY_TRUNCATE_CHARS);
    match message.role {
        ThreadRole::User => user_message(&text),
        ThreadRole::Assistant => assistant_message(&text),
    }
}

/// Truncates at a character boundary.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_system_prompt_plain() {
        let prompt = tool_system_prompt(None, &[]);
        assert!(prompt.contains("knowledge base"));
        assert!(!prompt.contains("Thread so far"));
        assert!(!prompt.contains("Who is asking"));
    }

    #[test]
    fn test_tool_system_prompt_with_context_and_history() {
        let history = vec![
            ThreadMessage::user("one"),
            ThreadMessage::assistant("two"),
            ThreadMessage::user("three"),
            ThreadMessage::assistant("four"),
            ThreadMessage::user("five"),
        ];
        let prompt = tool_system_prompt(Some("AE on the EMEA team"), &history);
        assert!(prompt.contains("AE on the EMEA team"));
        // Only the last four messages survive.
        assert!(!prompt.contains("- user: one"));
        assert!(prompt.contains("- you: two"));
        assert!(prompt.contains("- user: five"));
    }

    #[test]
    fn test_history_truncation() {
        let long = "x".repeat(500);
        let history = vec![ThreadMessage::user(&long)];
        let prompt = tool_system_prompt(None, &history);
        assert!(!prompt.contains(&long));
        assert!(prompt.contains(&"x".repeat(HISTORY_TRUNCATE_CHARS)));
    }

    #[test]
    fn test_tool_user_message_attachments_truncated() {
        let attachment = Attachment {
            name: "contract.txt".to_string(),
            text: "y".repeat(5_000),
        };
        let message = tool_user_message("What is this?", &[attachment]);
        assert!(message.contains("contract.txt"));
        assert!(message.len() < 5_000);
    }

    #[test]
    fn test_synthesis_messages_shape() {
        let history = vec![
            ThreadMessage::user("parent question"),
            ThreadMessage::assistant("a"),
            ThreadMessage::user("b"),
            ThreadMessage::assistant("c"),
            ThreadMessage::user("d"),
        ];
        let fetched = vec![FetchedArticle {
            url: "docs/currency.md".to_string(),
            title: "Multi-currency".to_string(),
            content: "Light supports…".to_string(),
        }];
        let messages = synthesis_messages("the question", &history, &fetched);

        // system + parent + last 3 + user evidence message
        assert_eq!(messages.len(), 6);
        assert!(messages[1].content.contains("parent question"));
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        assert!(last.contains("[1] Multi-currency (docs/currency.md)"));
        assert!(last.contains("Question: the question"));
    }

    #[test]
    fn test_synthesis_messages_short_history_no_duplicate_parent() {
        let history = vec![
            ThreadMessage::user("parent"),
            ThreadMessage::assistant("reply"),
        ];
        let messages = synthesis_messages("q", &history, &[]);
        let parents = messages
            .iter()
            .filter(|m| m.content.contains("parent"))
            .count();
        assert_eq!(parents, 1);
    }
}
