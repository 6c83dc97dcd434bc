//! Best-effort regex extraction of actionable items from assistant replies.
//!
//! Four independent pattern families run in order; their results are
//! concatenated and de-duplicated by case-insensitive text, preserving
//! first-seen order. This is a heuristic, not a parser: false positives and
//! negatives are expected, the contract is determinism.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use pagelens_common::{ConversationEntry, Role, Task, TaskSource};
use regex::Regex;

static MARKDOWN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)-?\s*\[[\sx]\]\s*(.+)").unwrap());

static TODO_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)TODO[:\-]?\s*(.+)").unwrap());

static ACTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:Action\s*(?:item)?[:\-]?|Next\s*step[:\-]?)\s*(.+)").unwrap());

static LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\d+\.|[-*])\s+(.+)$").unwrap());

/// Minimum length for a generic list line to count as a task.
const MIN_LIST_ITEM_LEN: usize = 10;

/// Scan `text` for action items across all four pattern families.
pub fn extract_tasks(text: &str) -> Vec<Task> {
    let mut tasks = Vec::new();

    for captures in MARKDOWN_PATTERN.captures_iter(text) {
        push_task(&mut tasks, &captures[1], TaskSource::Markdown);
    }

    for captures in TODO_PATTERN.captures_iter(text) {
        push_task(&mut tasks, &captures[1], TaskSource::Todo);
    }

    for captures in ACTION_PATTERN.captures_iter(text) {
        push_task(&mut tasks, &captures[1], TaskSource::Action);
    }

    for captures in LIST_PATTERN.captures_iter(text) {
        let candidate = captures[1].trim();
        // Too-short and lowercase-initial lines are usually prose fragments,
        // and checkbox bodies already belong to the markdown family.
        if candidate.chars().count() > MIN_LIST_ITEM_LEN
            && !candidate.starts_with(|c: char| c.is_ascii_lowercase())
            && !candidate.starts_with('[')
        {
            push_task(&mut tasks, candidate, TaskSource::List);
        }
    }

    dedup_by_text(tasks)
}

/// Run the extractor over the assistant side of a conversation.
pub fn extract_tasks_from_conversation(entries: &[ConversationEntry]) -> Vec<Task> {
    let mut all = Vec::new();
    for entry in entries {
        if entry.role == Role::Assistant {
            all.extend(extract_tasks(&entry.content));
        }
    }
    all
}

fn push_task(tasks: &mut Vec<Task>, text: &str, source: TaskSource) {
    tasks.push(Task {
        text: text.trim().to_string(),
        completed: false,
        source,
    });
}

fn dedup_by_text(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for task in tasks {
        if seen.insert(task.text.to_lowercase()) {
            unique.push(task);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_three_families_from_mixed_input() {
        let text = "- [ ] Buy milk\nTODO: call Bob\n1. Finish the report draft";
        let tasks = extract_tasks(text);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].text, "Buy milk");
        assert_eq!(tasks[0].source, TaskSource::Markdown);
        assert_eq!(tasks[1].text, "call Bob");
        assert_eq!(tasks[1].source, TaskSource::Todo);
        assert_eq!(tasks[2].text, "Finish the report draft");
        assert_eq!(tasks[2].source, TaskSource::List);
        assert!(tasks.iter().all(|t| !t.completed));
    }

    #[test]
    fn action_and_next_step_prefixes_are_recognized() {
        let text = "Action: Review the design doc\nNext step: Schedule the meeting";
        let tasks = extract_tasks(text);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].text, "Review the design doc");
        assert_eq!(tasks[0].source, TaskSource::Action);
        assert_eq!(tasks[1].text, "Schedule the meeting");
        assert_eq!(tasks[1].source, TaskSource::Action);
    }

    #[test]
    fn list_items_filter_short_and_lowercase_lines() {
        let text = "1. ok\n2. continue with the plan\n3. Ship the release notes";
        let tasks = extract_tasks(text);

        // "ok" is too short, "continue..." starts lowercase.
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Ship the release notes");
        assert_eq!(tasks[0].source, TaskSource::List);
    }

    #[test]
    fn duplicates_are_removed_case_insensitively_keeping_first() {
        let text = "TODO: Send the invoice\n- [ ] send the INVOICE";
        let tasks = extract_tasks(text);

        assert_eq!(tasks.len(), 1);
        // Markdown family runs first, so its casing wins.
        assert_eq!(tasks[0].text, "send the INVOICE");
        assert_eq!(tasks[0].source, TaskSource::Markdown);
    }

    #[test]
    fn completed_checkboxes_still_extract() {
        let tasks = extract_tasks("- [x] Already done thing");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "Already done thing");
        assert_eq!(tasks[0].source, TaskSource::Markdown);
    }

    #[test]
    fn same_input_yields_same_output() {
        let text = "TODO: a stable answer\n1. Another Stable Answer here";
        assert_eq!(extract_tasks(text), extract_tasks(text));
    }

    #[test]
    fn plain_prose_yields_no_tasks() {
        let tasks = extract_tasks("The page describes the history of tea in two paragraphs.");
        assert!(tasks.is_empty());
    }

    #[test]
    fn conversation_scan_only_reads_assistant_entries() {
        let entries = vec![
            ConversationEntry::user("TODO: this should be ignored"),
            ConversationEntry::assistant("TODO: pick this one up"),
        ];
        let tasks = extract_tasks_from_conversation(&entries);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "pick this one up");
    }
}
