//! SQL tokens — positioned edits over the original SQL text.
//!
//! Tokens are validated and sorted once into [`SqlTokens`], then rendered per
//! route unit with a single forward scan that copies untouched text between
//! tokens. The original text is never mutated.

use crate::error::{ShardxError, ShardxResult};
use crate::route::RouteUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Same replacement for every unit (pagination, derived projections, ...)
    Static(String),
    /// Logical table occurrence, replaced by the unit's actual table
    Table { logic_name: String },
    /// Whole VALUES list; each unit renders only the rows routed to it
    InsertValues { rows: Vec<String> },
}

/// Replace `stop - start` bytes at `start`; a zero-width token inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlToken {
    pub start: usize,
    pub stop: usize,
    pub kind: TokenKind,
}

impl SqlToken {
    pub fn replace(start: usize, stop: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            stop,
            kind: TokenKind::Static(text.into()),
        }
    }

    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::replace(position, position, text)
    }

    pub fn table(start: usize, stop: usize, logic_name: &str) -> Self {
        Self {
            start,
            stop,
            kind: TokenKind::Table {
                logic_name: logic_name.to_string(),
            },
        }
    }

    fn render(&self, original: &str, target: &RenderTarget<'_>) -> String {
        match &self.kind {
            TokenKind::Static(text) => text.clone(),
            TokenKind::Table { logic_name } => target
                .unit
                .and_then(|u| u.actual_table(logic_name))
                .map(str::to_string)
                .unwrap_or_else(|| original.to_string()),
            TokenKind::InsertValues { rows } => match target.rows {
                Some(selected) => selected
                    .iter()
                    .filter_map(|r| rows.get(*r))
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                None => rows.join(", "),
            },
        }
    }
}

/// What a token set is rendered for.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTarget<'a> {
    pub unit: Option<&'a RouteUnit>,
    /// INSERT rows of this unit; `None` keeps every row
    pub rows: Option<&'a [usize]>,
}

/// Sorted, non-overlapping token arena for one SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlTokens {
    tokens: Vec<SqlToken>,
}

impl SqlTokens {
    /// Sort by start position and reject invalid or overlapping spans.
    pub fn new(sql: &str, mut tokens: Vec<SqlToken>) -> ShardxResult<Self> {
        for token in &tokens {
            if token.start > token.stop
                || token.stop > sql.len()
                || !sql.is_char_boundary(token.start)
                || !sql.is_char_boundary(token.stop)
            {
                return Err(ShardxError::TokenOutOfBounds {
                    start: token.start,
                    stop: token.stop,
                    len: sql.len(),
                });
            }
        }
        tokens.sort_by_key(|t| (t.start, t.stop));
        for pair in tokens.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            // two inserts at one position would leave their order ambiguous
            let same_insert = first.start == first.stop && second.start == second.stop && first.start == second.start;
            if first.stop > second.start || same_insert {
                return Err(ShardxError::OverlappingTokens {
                    first_start: first.start,
                    first_stop: first.stop,
                    second_start: second.start,
                    second_stop: second.stop,
                });
            }
        }
        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[SqlToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Build the rewritten SQL in one forward pass.
    pub fn render(&self, sql: &str, target: &RenderTarget<'_>) -> String {
        let mut out = String::with_capacity(sql.len() + 16 * self.tokens.len());
        let mut cursor = 0;
        for token in &self.tokens {
            out.push_str(&sql[cursor..token.start]);
            out.push_str(&token.render(&sql[token.start..token.stop], target));
            cursor = token.stop;
        }
        out.push_str(&sql[cursor..]);
        out
    }
}
