//! FILENAME: interpreter/src/block.rs
//! PURPOSE: Logical script blocks and their classification.
//! CONTEXT: The lexical front end that splits raw text into blocks is an
//! external collaborator; `Block::from_text` is a small stand-in for it
//! that embedders and tests can use. Classification itself belongs here:
//! a block is a comment run, an object definition (`Create <Type>
//! <names...>`), a command (leading keyword from the command table), or an
//! assignment (anything else containing `=`).

use crate::error::{InterpretError, InterpretResult};
use serde::{Deserialize, Serialize};

/// Command keywords recognized by the classifier. Dispatch of these is a
/// skeleton: the block is recorded and routed, never executed here.
pub const COMMAND_KEYWORDS: &[&str] = &[
    "Propagate", "Maneuver", "Target", "EndTarget", "Achieve", "Vary", "Save",
    "Toggle", "Report", "Stop",
];

/// One classified unit of script text with its original line span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    pub first_line: usize,
    pub last_line: usize,
}

/// The shape a block was classified as.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A run of comment or blank lines; no executable chunks.
    Comment,

    /// `Create <Type> <names...>`, optionally with `name[rows,cols]`
    /// array dimensions.
    Definition {
        type_name: String,
        names: Vec<String>,
    },

    /// A block led by a known command keyword.
    Command { keyword: String },

    /// `lhs = rhs`.
    Assignment { lhs: String, rhs: String },
}

impl Block {
    pub fn new(text: impl Into<String>, first_line: usize, last_line: usize) -> Self {
        Block {
            text: text.into(),
            first_line,
            last_line,
        }
    }

    /// Splits raw script text into blocks, merging consecutive comment and
    /// blank lines into a single comment block. Line numbers are 1-based.
    pub fn from_text(text: &str) -> Vec<Block> {
        fn flush_comment(
            blocks: &mut Vec<Block>,
            start: &mut Option<usize>,
            lines: &mut Vec<&str>,
        ) {
            if let Some(first) = start.take() {
                let last = first + lines.len() - 1;
                blocks.push(Block::new(lines.join("\n"), first, last));
                lines.clear();
            }
        }

        let mut blocks: Vec<Block> = Vec::new();
        let mut comment_start: Option<usize> = None;
        let mut comment_lines: Vec<&str> = Vec::new();

        for (index, line) in text.lines().enumerate() {
            let number = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                if comment_start.is_none() {
                    comment_start = Some(number);
                }
                comment_lines.push(line);
            } else {
                flush_comment(&mut blocks, &mut comment_start, &mut comment_lines);
                blocks.push(Block::new(line, number, number));
            }
        }
        flush_comment(&mut blocks, &mut comment_start, &mut comment_lines);
        blocks
    }

    /// Classifies the block. Inline trailing comments are ignored;
    /// classification never executes anything.
    pub fn classify(&self) -> InterpretResult<Classification> {
        let code = strip_inline_comment(&self.text);
        let code = code.trim().trim_end_matches(';').trim();
        if code.is_empty() {
            return Ok(Classification::Comment);
        }

        let mut words = code.split_whitespace();
        let first = words.next().unwrap_or("");

        if first == "Create" {
            let type_name = words
                .next()
                .ok_or_else(|| {
                    InterpretError::Definition(format!("missing type in: {}", code))
                })?
                .to_string();
            let names: Vec<String> = words.map(str::to_string).collect();
            if names.is_empty() {
                return Err(InterpretError::Definition(format!(
                    "no names given in: {}",
                    code
                )));
            }
            return Ok(Classification::Definition { type_name, names });
        }

        if COMMAND_KEYWORDS.contains(&first) {
            return Ok(Classification::Command {
                keyword: first.to_string(),
            });
        }

        if let Some(eq) = code.find('=') {
            let lhs = code[..eq].trim().to_string();
            let rhs = code[eq + 1..].trim().to_string();
            if lhs.is_empty() || rhs.is_empty() {
                return Err(InterpretError::Assignment(format!(
                    "missing side in: {}",
                    code
                )));
            }
            return Ok(Classification::Assignment { lhs, rhs });
        }

        Err(InterpretError::Classify(code.to_string()))
    }
}

/// Drops everything from the first `%` that is not inside a quoted string.
fn strip_inline_comment(line: &str) -> &str {
    let mut in_quote = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '%' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}
