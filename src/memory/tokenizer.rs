//! 分词：中英文混合文本切词，用于描述检索打分
//!
//! 含 CJK 字符时走 jieba（搜索引擎模式），纯英文按空白切分；输出统一小写。

use jieba_rs::Jieba;
use std::sync::OnceLock;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

/// 切词；过滤单字符英文噪音，保留 CJK 单字
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if text.chars().any(is_cjk) {
        JIEBA
            .get_or_init(Jieba::new)
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.to_lowercase())
            .filter(|s| s.len() > 1 || s.chars().next().map(is_cjk).unwrap_or(false))
            .collect()
    } else {
        text.split_whitespace()
            .map(|s| s.to_lowercase())
            .filter(|s| s.len() > 1)
            .collect()
    }
}

/// 词重叠计分：query 与 doc 切词后的交集大小
pub fn overlap_score(query: &str, doc: &str) -> usize {
    use std::collections::HashSet;
    let q: HashSet<String> = tokenize(query).into_iter().collect();
    let d: HashSet<String> = tokenize(doc).into_iter().collect();
    q.intersection(&d).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_whitespace_split() {
        let tokens = tokenize("Preferred Editor Config");
        assert_eq!(tokens, vec!["preferred", "editor", "config"]);
    }

    #[test]
    fn test_cjk_goes_through_jieba() {
        let tokens = tokenize("用户偏好的编辑器");
        assert!(!tokens.is_empty());
    }

    #[test]
    fn test_overlap_scoring() {
        assert!(overlap_score("editor preference", "the user editor preference is vim") >= 2);
        assert_eq!(overlap_score("editor", "completely unrelated"), 0);
    }
}
