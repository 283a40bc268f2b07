//! Text normalization applied to issue bodies before indexing and search.
//!
//! [`normalize`] removes the boilerplate of the known submission templates
//! and then strips markdown:
//!
//! 1. Issue tracker labels (`Description:`, `Environment:`, ...).
//! 2. The GitHub issue form (`### PHP Version` ... `### How to reproduce`).
//! 3. HTML comments, the numbered pull request headers and checklist lines.
//! 4. Markdown formatting.
//! 5. Leading/trailing spaces, tabs, newlines and carriage returns.
//!
//! Boilerplate runs first: several labels are anchored on `###` heading
//! markers that the markdown pass removes. The whole pass is repeated until
//! the text stops changing, so stripping one construct cannot expose
//! another one in the output (e.g. `> ### heading`, `- 1. item`).

use regex::Regex;
use std::sync::LazyLock;

/// Template boilerplate, applied in order and replaced with nothing.
static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Issue tracker template.
        r"(?m)^[ \t]*Description:\s*",
        r"(?m)^[ \t]*Environment:\s*",
        r"(?m)^[ \t]*Steps to reproduce:\s*",
        r"(?m)^[ \t]*Expected result:\s*",
        r"(?m)^[ \t]*Actual result:\s*",
        // GitHub issue template.
        r"(?s)### PHP Version.*?### Expected behaviour[ \t]*\n*",
        r"(?m)^### Actual behaviour\s*",
        r"(?m)^### How to reproduce\s*",
        // GitHub pull request template.
        r"(?s)<!--.*?-->",
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?1\. Why is this change necessary\?[ \t]*$",
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?2\. What does this change do, exactly\?[ \t]*$",
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?3\. Describe each step to reproduce the issue or behaviour\.[ \t]*$",
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?4\. Please link to the relevant issues \(if any\)\.[ \t]*$",
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*)?5\. Checklist[ \t]*$",
        r"(?m)^[ \t]*(?:[0-9]+|[a-z])\.[ \t]*$",
        r"(?m)^[ \t]*[-*] \[[ xX]\].*(?:\n|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Markdown constructs and their replacement, applied in order.
static MARKDOWN: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // fences
        (r"(?m)^[ \t]*`{3,}.*$", ""),
        // horizontal rules
        (r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,}|={3,})[ \t]*$", ""),
        // blockquotes, before headings so `> ### x` loses both markers
        (r"(?m)^[ \t]*(?:>[ \t]?)+", ""),
        // ATX headings; `#123` references are kept
        (r"(?m)^[ \t]{0,3}#{1,6}(?:[ \t]+|$)", ""),
        // list leaders, nested ones included (`- 1. item`)
        (r"(?m)^([ \t]*)(?:(?:[*+-]|[0-9]+\.)[ \t]+)+", "$1"),
        // reference definitions
        (r"(?m)^[ \t]{0,3}\[[^\]\n]+\]:[ \t]*\S+.*$", ""),
        (r"!\[([^\]\n]*)\]\([^)\n]*\)", "$1"),
        (r"\[([^\]\n]*)\]\([^)\n]*\)", "$1"),
        (r"\*\*([^*\n]+)\*\*", "$1"),
        (r"__([^_\n]+)__", "$1"),
        (r"\*([^*\n]+)\*", "$1"),
        (r"\b_([^_\n]+)_\b", "$1"),
        (r"~~([^~\n]+)~~", "$1"),
        (r"`([^`\n]+)`", "$1"),
        // inline html
        (r"</?[A-Za-z][^>\n]*>", ""),
        (r"(?m)[ \t]+$", ""),
        (r"\n{3,}", "\n\n"),
    ]
    .iter()
    .map(|(p, r)| (Regex::new(p).unwrap(), *r))
    .collect()
});

/// Removes template boilerplate and markdown from a raw issue body.
///
/// Pure and deterministic. Whitespace-only input yields an empty string.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.to_string();
    // Every rewrite only removes characters, so this reaches a fixed point.
    loop {
        let next = normalize_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn normalize_pass(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n");

    for pattern in BOILERPLATE.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }

    text = strip_markdown(&text);

    text.trim_matches(|c| matches!(c, ' ' | '\n' | '\t' | '\r'))
        .to_string()
}

/// Strips markdown formatting while keeping the text it decorates.
pub fn strip_markdown(text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, replacement) in MARKDOWN.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB_ISSUE: &str = "### PHP Version\n\n7\n\n### Shopware Version\n\n6.4.10\n\n### Expected behaviour\n\nPaging in Custom-Field-Sets works\n\n### Actual behaviour\n\npaging doesnt work. Always Page 1 is requested.\n\n### How to reproduce\n\ncreate more than 25 custom-field-sets and try to page to page 2.";

    const TRACKER_ISSUE: &str = "Description: Inside the entity.xml file (app system) entities can be described and on install the corresponding database tables are created. However, if the app is uninstalled and \"Remove all app data permanently\" is *not* selected the database tables are removed anyway.\n\nEnvironment: 6.4.20.0\n\nSteps to reproduce: Create an entity.xml file within a valid app. Install the app. Then uninstall the app, but *don't* select \"Remove all app data permanently\".\n\nExpected result: The database tables still exist\n\nActual result: The database tables are removed\n\n--------------------\n\nThis way essential data is lost even though the user selected to keep the user data.";

    const PULL_REQUEST: &str = "<!--\nThank you for contributing to Shopware! Please fill out this description template to help us to process your pull request.\n\nPlease make sure to fulfil our contribution guideline (https://docs.shopware.com/en/shopware-platform-dev-en/community/contribution-guideline?category=shopware-platform-dev-en/community).\n\nDo your changes need to be mentioned in the documentation?\nAdd notes on your change right now in the documentation files in /src/Docs/Resources and add them to the pull request as well. \n-->\n\n### 1. Why is this change necessary?\nNo more than 10 custom fields can be handled in the Custom Field Set administration view.\n\n### 2. What does this change do, exactly?\nAdd the total-count-mode param.\n\n### 3. Describe each step to reproduce the issue or behaviour.\nIf you are on the detail page of a customfieldset you only get 10 customfields displayed, because there's a parameter limit: 10 when calling the API.\n\nAs there's no pagination, that makes it impossible to get the other custom fields.\n\n### 4. Please link to the relevant issues (if any).\n#1105 \n\n### 5. Checklist\n\n- [ ] I have written tests and verified that they fail without my change\n- [x] I have squashed any insignificant commits\n- [x] I have written or adjusted the documentation according to my changes\n- [x] This change has comments for package types, values, functions, and non-obvious lines of code\n- [x] I have read the contribution requirements and fulfil them.\n";

    const EMPTY_PULL_REQUEST: &str = "<!--\nThank you for contributing to Shopware! Please fill out this description template.\n-->\n\n### 1. Why is this change necessary?\n\n\n### 2. What does this change do, exactly?\n\n\n### 3. Describe each step to reproduce the issue or behaviour.\n\n\n### 4. Please link to the relevant issues (if any).\n\n\n### 5. Checklist\n\n- [ ] I have written tests and verified that they fail without my change\n- [ ] I have squashed any insignificant commits\n- [ ] I have read the contribution requirements and fulfil them.\n";

    const MARKDOWN_BODY: &str = "## Summary\n\nThe **checkout** fails with `NullPointerException` when the [cart](https://example.com/cart) is _empty_.\n\n> Quoted error line\n\n* first step\n* second step\n\n```php\n$cart->total();\n```\n\nSee snake_case_name and ~~old~~ new <b>bold</b>.";

    #[test]
    fn test_short_github_template() {
        let raw = "### PHP Version\n\n7\n\n### Expected behaviour\n\nWorks\n\n### Actual behaviour\n\nFails\n\n### How to reproduce\n\nSteps here.";
        assert_eq!(normalize(raw), "Works\n\nFails\n\nSteps here.");
    }

    #[test]
    fn test_only_newlines() {
        assert_eq!(normalize("\n\n"), "");
        assert_eq!(normalize(" \t\r\n "), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_github_issue_template() {
        assert_eq!(
            normalize(GITHUB_ISSUE),
            "Paging in Custom-Field-Sets works\n\npaging doesnt work. Always Page 1 is requested.\n\ncreate more than 25 custom-field-sets and try to page to page 2."
        );
    }

    #[test]
    fn test_issue_tracker_template() {
        assert_eq!(
            normalize(TRACKER_ISSUE),
            "Inside the entity.xml file (app system) entities can be described and on install the corresponding database tables are created. However, if the app is uninstalled and \"Remove all app data permanently\" is not selected the database tables are removed anyway.\n\n6.4.20.0\n\nCreate an entity.xml file within a valid app. Install the app. Then uninstall the app, but don't select \"Remove all app data permanently\".\n\nThe database tables still exist\n\nThe database tables are removed\n\nThis way essential data is lost even though the user selected to keep the user data."
        );
    }

    #[test]
    fn test_pull_request_template() {
        assert_eq!(
            normalize(PULL_REQUEST),
            "No more than 10 custom fields can be handled in the Custom Field Set administration view.\n\nAdd the total-count-mode param.\n\nIf you are on the detail page of a customfieldset you only get 10 customfields displayed, because there's a parameter limit: 10 when calling the API.\n\nAs there's no pagination, that makes it impossible to get the other custom fields.\n\n#1105"
        );
    }

    #[test]
    fn test_empty_pull_request_template() {
        assert_eq!(normalize(EMPTY_PULL_REQUEST), "");
    }

    #[test]
    fn test_markdown_is_stripped() {
        assert_eq!(
            normalize(MARKDOWN_BODY),
            "Summary\n\nThe checkout fails with NullPointerException when the cart is empty.\n\nQuoted error line\n\nfirst step\nsecond step\n\n$cart->total();\n\nSee snake_case_name and old new bold."
        );
    }

    #[test]
    fn test_idempotent_on_templates() {
        for raw in [
            GITHUB_ISSUE,
            TRACKER_ISSUE,
            PULL_REQUEST,
            EMPTY_PULL_REQUEST,
            MARKDOWN_BODY,
            "\n\n",
            "> ### Expected behaviour\n\nFails",
            "### 1. Why is this change necessary?\n- 1. first\n- 2. second\n",
            "Steps to reproduce:\n1. - open cart\n2. - apply coupon\n\nExpected result: > total is reduced",
            "Description: > # Broken cart",
            "> > nested quote\n>\n> * [link](https://example.com)",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_template_headers_and_checklists_removed() {
        let out = normalize(PULL_REQUEST);
        for header in [
            "Why is this change necessary",
            "What does this change do",
            "Describe each step",
            "Please link to the relevant issues",
            "Checklist",
            "[x]",
            "[ ]",
            "I have squashed",
            "<!--",
        ] {
            assert!(!out.contains(header), "{:?} survived in {:?}", header, out);
        }

        let out = normalize(GITHUB_ISSUE);
        for header in ["PHP Version", "Shopware Version", "###", "Actual behaviour"] {
            assert!(!out.contains(header), "{:?} survived in {:?}", header, out);
        }
    }

    #[test]
    fn test_labels_inside_prose_are_kept() {
        let raw = "The docs say Expected result: nothing, but 1. Why is this change necessary? stays inline.";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_stacked_markers_are_stripped_in_one_call() {
        assert_eq!(
            normalize("> ### Expected behaviour\n\nFails"),
            "Expected behaviour\n\nFails"
        );
        assert_eq!(
            normalize("### 1. Why is this change necessary?\n- 1. first\n- 2. second\n"),
            "first\nsecond"
        );
        assert_eq!(
            normalize("Steps to reproduce:\n1. - open cart\n2. - apply coupon"),
            "open cart\napply coupon"
        );
        assert_eq!(normalize("Description: > # Broken cart"), "Broken cart");
    }

    #[test]
    fn test_crlf_input() {
        assert_eq!(
            normalize("Description: Broken\r\n\r\nEnvironment: 6.5\r\n"),
            "Broken\n\n6.5"
        );
    }
}
