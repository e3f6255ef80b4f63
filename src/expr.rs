// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Alert expression parsing capability.
//!
//! The query language behind an alert rule's `expr` is not ours to parse.
//! Callers inject an [`ExprParser`] that turns the free text into a
//! structured query, and we store whatever it hands back.

use serde_json::Value;

/// Turn alert rule text into a structured query.
pub trait ExprParser: Send + Sync {
    /// Parse expression, returning a human-readable message on failure.
    fn parse(&self, expr: &str) -> Result<Value, String>;
}

impl<F> ExprParser for F
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync,
{
    fn parse(&self, expr: &str) -> Result<Value, String> {
        self(expr)
    }
}

/// Parser that accepts any non-empty text and keeps it verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawExprParser;

impl ExprParser for RawExprParser {
    fn parse(&self, expr: &str) -> Result<Value, String> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err("expression is empty".into());
        }

        Ok(serde_json::json!({ "raw": expr }))
    }
}
