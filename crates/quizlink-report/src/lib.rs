//! quizlink-report: Markdown and HTML renderings of quizlink results.
//!
//! `markdown` turns an audit report into per-chapter mismatch tables;
//! `html` produces a self-contained coverage page for a set of chapters.

pub mod html;
pub mod markdown;

pub use html::{generate_html, write_html_report};
pub use markdown::{audit_to_markdown, write_audit_markdown};
