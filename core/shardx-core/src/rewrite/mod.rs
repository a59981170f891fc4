//! SQL rewriting — logical SQL to one physical SQL per route unit.
//!
//! Rewriting is purely textual: [`generator`] turns the statement into a set
//! of positioned [`token::SqlToken`]s plus a [`parameter::ParameterBuilder`],
//! and [`RewriteEngine`] renders both for each unit of the route.

pub mod engine;
pub mod generator;
pub mod parameter;
pub mod token;


pub use engine::RewriteEngine;
pub use parameter::{GroupedParameterBuilder, ParameterBuilder, StandardParameterBuilder};
pub use token::{RenderTarget, SqlToken, SqlTokens, TokenKind};
