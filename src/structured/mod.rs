//! 结构化输出事件流
//!
//! 核心只消费分类后的事件流 {header, bullet, code_block, line_match, finish}，
//! 不关心分类如何产生；此处附带一个基于行的 regex 分类器作为默认实现。

use regex::Regex;
use serde::Serialize;

/// 从原始文本分类出的标记事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkupEvent {
    Header { level: usize, text: String },
    Bullet { text: String },
    CodeBlock { text: String },
    LineMatch { pattern: String, text: String },
    /// 流结束；remainder 为未被任何规则命中的剩余文本
    Finish { remainder: String },
}

/// 行分类器：内置 Markdown 规则 + 可追加的命名 regex 规则
pub struct LineClassifier {
    patterns: Vec<(String, Regex)>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// 追加一条命名规则；命中的行以 LineMatch 事件给出
    pub fn with_pattern(mut self, name: impl Into<String>, pattern: &str) -> Result<Self, String> {
        let re = Regex::new(pattern).map_err(|e| e.to_string())?;
        self.patterns.push((name.into(), re));
        Ok(self)
    }

    /// 逐行分类；``` 围栏内的行累积为 CodeBlock，流末尾必然是一条 Finish
    pub fn classify(&self, text: &str) -> Vec<MarkupEvent> {
        let mut events = Vec::new();
        let mut remainder = Vec::new();
        let mut code: Option<Vec<String>> = None;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                match code.take() {
                    Some(lines) => events.push(MarkupEvent::CodeBlock {
                        text: lines.join("\n"),
                    }),
                    None => code = Some(Vec::new()),
                }
                continue;
            }
            if let Some(lines) = code.as_mut() {
                lines.push(line.to_string());
                continue;
            }

            let trimmed = line.trim_start();
            if let Some(stripped) = trimmed.strip_prefix('#') {
                let level = 1 + stripped.chars().take_while(|c| *c == '#').count();
                let text = stripped.trim_start_matches('#').trim();
                events.push(MarkupEvent::Header {
                    level,
                    text: text.to_string(),
                });
                continue;
            }
            if let Some(text) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            {
                events.push(MarkupEvent::Bullet {
                    text: text.trim().to_string(),
                });
                continue;
            }
            if let Some((name, _)) = self.patterns.iter().find(|(_, re)| re.is_match(line)) {
                events.push(MarkupEvent::LineMatch {
                    pattern: name.clone(),
                    text: line.to_string(),
                });
                continue;
            }
            remainder.push(line);
        }

        // 未闭合的围栏按代码块收尾
        if let Some(lines) = code.take() {
            events.push(MarkupEvent::CodeBlock {
                text: lines.join("\n"),
            });
        }
        events.push(MarkupEvent::Finish {
            remainder: remainder.join("\n").trim().to_string(),
        });
        events
    }
}
