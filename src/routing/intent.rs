//! Keyword heuristics that infer a task class from task text.

use super::TaskClass;

/// Words that indicate code work or other high-stakes changes.
const NON_BASIC_KEYWORDS: &[&str] = &[
    "refactor",
    "refactoring",
    "test",
    "tests",
    "testing",
    "fix",
    "fixes",
    "debug",
    "implement",
    "migrate",
];

/// Words that indicate cheap transformation work.
const BASIC_KEYWORDS: &[&str] = &[
    "format",
    "summarize",
    "summarise",
    "summary",
    "list",
    "classify",
    "rename",
];

/// Task class inferred from text, with the keyword that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub task_class: TaskClass,
    /// `None` when no keyword matched and the default applied
    pub keyword: Option<&'static str>,
}

impl Inference {
    /// Short explanation for plan rationales.
    pub fn reason(&self) -> String {
        match self.keyword {
            Some(keyword) => format!("inferred {} from '{}'", self.task_class, keyword),
            None => format!("no keyword matched, defaulted to {}", self.task_class),
        }
    }
}

/// Infer the task class from free text.
///
/// NON_BASIC keywords win when both kinds appear. Text without any keyword
/// defaults to BASIC.
pub fn infer(text: &str) -> Inference {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let matched = |keywords: &[&'static str]| {
        keywords
            .iter()
            .copied()
            .find(|keyword| words.contains(keyword))
    };

    if let Some(keyword) = matched(NON_BASIC_KEYWORDS) {
        return Inference {
            task_class: TaskClass::NonBasic,
            keyword: Some(keyword),
        };
    }
    Inference {
        task_class: TaskClass::Basic,
        keyword: matched(BASIC_KEYWORDS),
    }
}

pub fn infer_task_class(text: &str) -> TaskClass {
    infer(text).task_class
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_work_is_non_basic() {
        assert_eq!(
            infer_task_class("Refactor the parser module"),
            TaskClass::NonBasic
        );
        assert_eq!(infer_task_class("fix the flaky test"), TaskClass::NonBasic);
    }

    #[test]
    fn cheap_work_is_basic() {
        assert_eq!(infer_task_class("summarize this thread"), TaskClass::Basic);
        assert_eq!(infer_task_class("format as a list"), TaskClass::Basic);
    }

    #[test]
    fn non_basic_wins_on_mixed_text() {
        assert_eq!(
            infer_task_class("summarize and then fix the bug"),
            TaskClass::NonBasic
        );
    }

    #[test]
    fn default_is_basic() {
        assert_eq!(infer_task_class(""), TaskClass::Basic);
        assert_eq!(infer_task_class("hello there"), TaskClass::Basic);
    }

    #[test]
    fn inference_names_the_deciding_keyword() {
        let basic = infer("Summarize the standup notes");
        assert_eq!(basic.task_class, TaskClass::Basic);
        assert_eq!(basic.keyword, Some("summarize"));
        assert_eq!(basic.reason(), "inferred BASIC from 'summarize'");

        let fallback = infer("hello there");
        assert_eq!(fallback.keyword, None);
        assert_eq!(fallback.reason(), "no keyword matched, defaulted to BASIC");

        assert_eq!(infer("list then fix").keyword, Some("fix"));
    }

    #[test]
    fn matches_whole_words_only() {
        // "latest" contains "test" but is not the keyword.
        assert_eq!(infer_task_class("show the latest news"), TaskClass::Basic);
    }
}
