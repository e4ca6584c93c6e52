//! Fenced code block extraction from finished narration text.

use serde::Serialize;

const FENCE: &str = "```";

/// Language assigned to fences without a tag.
pub const DEFAULT_LANGUAGE: &str = "tsx";

/// One fenced block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: String,
    pub content: String,
}

/// Extracts fenced blocks in document order.
///
/// An opening fence is three backticks, an optional run of word characters as
/// the language tag, then whitespace containing at least one newline. The body
/// runs to the next three backticks and is trimmed; empty bodies are skipped.
/// Scanning resumes after each closing fence. An unterminated fence ends the
/// scan.
pub fn extract(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find(FENCE) {
        let open = cursor + offset;
        let after_fence = open + FENCE.len();
        let Some((language, body_offset)) = parse_opening(&text[after_fence..]) else {
            // Not an opening here; a fence may still start one backtick later.
            cursor = open + 1;
            continue;
        };
        let body_start = after_fence + body_offset;
        let Some(body_len) = text[body_start..].find(FENCE) else {
            break;
        };
        let content = text[body_start..body_start + body_len].trim();
        if !content.is_empty() {
            blocks.push(CodeBlock {
                language: language.unwrap_or(DEFAULT_LANGUAGE).to_string(),
                content: content.to_string(),
            });
        }
        cursor = body_start + body_len + FENCE.len();
    }
    blocks
}

/// Parses what follows an opening fence. Returns the tag (if any) and the
/// byte offset where the body begins.
fn parse_opening(rest: &str) -> Option<(Option<&str>, usize)> {
    let tag_len = rest
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(rest.len(), |(i, _)| i);
    let after_tag = &rest[tag_len..];
    let space_len = after_tag
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(after_tag.len(), |(i, _)| i);
    let newline = after_tag[..space_len].rfind('\n')?;
    let tag = (tag_len > 0).then(|| &rest[..tag_len]);
    Some((tag, tag_len + newline + 1))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(language: &str, content: &str) -> CodeBlock {
        CodeBlock {
            language: language.into(),
            content: content.into(),
        }
    }

    #[test]
    fn tagged_and_untagged_blocks_in_order() {
        let text = "```tsx\nconst x=1;\n```\n```\nplain\n```";
        assert_eq!(
            extract(text),
            vec![block("tsx", "const x=1;"), block("tsx", "plain")]
        );
    }

    #[test]
    fn keeps_explicit_language_and_trims_body() {
        let text = "Here you go:\n```sql  \n\n  SELECT 1;  \n```\nDone.";
        assert_eq!(extract(text), vec![block("sql", "SELECT 1;")]);
    }

    #[test]
    fn no_fences_yields_nothing() {
        assert!(extract("just narration, no code").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn whitespace_only_fence_is_discarded() {
        assert_eq!(
            extract("```\n   \n```\n```py\nprint(1)\n```"),
            vec![block("py", "print(1)")]
        );
    }

    #[test]
    fn back_to_back_blocks_are_independent() {
        let text = "```a\n1\n``````b\n2\n```";
        assert_eq!(extract(text), vec![block("a", "1"), block("b", "2")]);
    }

    #[test]
    fn tag_must_be_followed_by_newline() {
        // "tsx x" is not a valid opening and the trailing fence has nothing
        // after it.
        let text = "```tsx x\nbody\n```";
        assert!(extract(text).is_empty());
    }

    #[test]
    fn unterminated_fence_stops_scanning() {
        assert_eq!(
            extract("```js\nok\n```\n```tsx\nnever closed"),
            vec![block("js", "ok")]
        );
    }

    #[test]
    fn four_backticks_open_one_character_later() {
        assert_eq!(extract("````\ncode\n```"), vec![block("tsx", "code")]);
    }

    #[test]
    fn body_may_span_lines_and_hold_unicode() {
        let text = "```tsx\nconst a = 'é';\nconst b = 2;\n```";
        assert_eq!(
            extract(text),
            vec![block("tsx", "const a = 'é';\nconst b = 2;")]
        );
    }
}
