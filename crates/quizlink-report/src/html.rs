//! HTML coverage report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use anyhow::{Context, Result};
use std::path::Path;

use quizlink_core::model::Chapter;
use quizlink_core::report::ChapterSummary;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Generate a coverage report for linked chapters.
pub fn generate_html(chapters: &[Chapter]) -> String {
    let summaries: Vec<ChapterSummary> = chapters.iter().map(ChapterSummary::from_chapter).collect();
    let concepts: usize = summaries.iter().map(|s| s.concepts).sum();
    let questions: usize = summaries.iter().map(|s| s.questions).sum();
    let gaps: usize = summaries.iter().map(|s| s.gaps).sum();

    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str("<title>quizlink coverage report</title>\n");
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str("<h1>quizlink coverage report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">{} chapters | {} concepts | {} questions | {} concepts without questions | {}</p>\n",
        chapters.len(),
        concepts,
        questions,
        gaps,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\" id=\"summary\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">Chapter</th><th onclick=\"sortTable(1)\">Name</th><th onclick=\"sortTable(2)\">Concepts</th><th onclick=\"sortTable(3)\">Questions</th><th onclick=\"sortTable(4)\">With primary</th><th onclick=\"sortTable(5)\">Gaps</th><th onclick=\"sortTable(6)\">Coverage</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for s in &summaries {
        let class = if s.gaps == 0 { "pass" } else { "fail" };
        html.push_str(&format!(
            "<tr><td><a href=\"#{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{:.1}%</td></tr>\n",
            html_escape(&s.chapter_id),
            html_escape(&s.chapter_id),
            html_escape(&s.name),
            s.concepts,
            s.questions,
            s.questions_with_primary,
            class,
            s.gaps,
            s.coverage() * 100.0,
        ));
    }
    html.push_str("</tbody></table>\n");

    if !summaries.is_empty() {
        html.push_str(&generate_bar_chart(&summaries));
    }
    html.push_str("</section>\n");

    html.push_str("<section class=\"chapters\">\n");
    for chapter in chapters {
        html.push_str(&chapter_section(chapter));
    }
    html.push_str("</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

fn chapter_section(chapter: &Chapter) -> String {
    let mut html = format!(
        "<h2 id=\"{}\">{} {}</h2>\n",
        html_escape(&chapter.id),
        html_escape(&chapter.id),
        html_escape(&chapter.name)
    );

    html.push_str("<table class=\"concepts\">\n");
    html.push_str("<thead><tr><th>Concept</th><th>Term</th><th>Questions</th><th>Primary for</th><th>Confusable with</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for concept in &chapter.concepts {
        let primary_for = chapter
            .questions
            .iter()
            .filter(|q| q.primary_concept_id.as_deref() == Some(concept.id.as_str()))
            .count();
        let confusables = concept
            .confusable_ids
            .iter()
            .map(|id| html_escape(&format!("{} ({})", id, chapter.term_or_none(Some(id.as_str())))))
            .collect::<Vec<_>>()
            .join("<br>");
        let class = if concept.associated_question_ids.is_empty() {
            " class=\"fail\""
        } else {
            ""
        };
        html.push_str(&format!(
            "<tr{}><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            class,
            html_escape(&concept.id),
            html_escape(&concept.term),
            concept.associated_question_ids.len(),
            primary_for,
            confusables
        ));
    }
    html.push_str("</tbody></table>\n");
    html
}

fn generate_bar_chart(summaries: &[ChapterSummary]) -> String {
    let bar_height = 24;
    let max_width = 400;
    let padding = 8;
    let label_width = 120;

    let total_height = summaries.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, s) in summaries.iter().enumerate() {
        let coverage = s.coverage();
        let y = i * (bar_height + padding) + padding;
        let width = (coverage * max_width as f64) as usize;

        let color = if coverage >= 0.9 {
            "#22c55e"
        } else if coverage >= 0.6 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(&s.chapter_id)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{:.1}%</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            coverage * 100.0
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

/// Write an HTML coverage report to a file.
pub fn write_html_report(chapters: &[Chapter], path: &Path) -> Result<()> {
    let html = generate_html(chapters);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; vertical-align: top; }
th { background: var(--border); }
#summary th { cursor: pointer; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('summary');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    return asc ? va.localeCompare(vb, undefined, {numeric: true}) : vb.localeCompare(va, undefined, {numeric: true});
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
