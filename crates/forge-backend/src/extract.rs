//! Code extraction from model replies
//!
//! Models wrap the module in prose and Markdown fences. The first `python`
//! fence wins, then the first fence of any language, then the whole reply.

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};

/// Fenced code block found in a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// Info string language, if any
    pub language: Option<String>,
    /// Block contents
    pub code: String,
}

/// All fenced code blocks in document order
#[must_use]
pub fn fenced_blocks(reply: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<FencedBlock> = None;

    for event in Parser::new(reply) {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let language = info
                    .split_whitespace()
                    .next()
                    .map(str::to_ascii_lowercase);
                current = Some(FencedBlock {
                    language,
                    code: String::new(),
                });
            }
            Event::Text(text) => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
            }
            _ => {}
        }
    }

    blocks
}

/// Source text to treat as the candidate
#[must_use]
pub fn extract_code(reply: &str) -> String {
    let blocks = fenced_blocks(reply);
    let python = blocks
        .iter()
        .find(|b| matches!(b.language.as_deref(), Some("python" | "py" | "python3")));

    match python.or_else(|| blocks.first()) {
        Some(block) => block.code.clone(),
        None => {
            let mut text = reply.trim().to_string();
            text.push('\n');
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_fence_preferred() {
        let reply = "Setup:\n\n```bash\npip install mcp\n```\n\nServer:\n\n```python\nimport os\nx = 1\n```\n";
        assert_eq!(extract_code(reply), "import os\nx = 1\n");
    }

    #[test]
    fn untagged_fence_used_when_no_python() {
        let reply = "```\nprint('hi')\n```";
        assert_eq!(extract_code(reply), "print('hi')\n");
    }

    #[test]
    fn bare_reply_passed_through() {
        assert_eq!(extract_code("  import os\nx = 1  \n\n"), "import os\nx = 1\n");
    }

    #[test]
    fn block_languages_recorded() {
        let blocks = fenced_blocks("```Python title=server.py\na = 1\n```\n```json\n{}\n```\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[1].language.as_deref(), Some("json"));
    }
}
