use std::fmt::Write;

use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::{
    declare::{Section, Series, Source, Unit},
    report::{Report, Row},
};

const SPARKLINE_WIDTH: f64 = 80.0;
const SPARKLINE_HEIGHT: f64 = 20.0;

const COLOR_UP: &str = "#ef4444";
const COLOR_DOWN: &str = "#22c55e";
const COLOR_MUTED: &str = "#94a3b8";

const STYLE: &str = r#"
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', sans-serif;
    background: #0f172a; color: #e2e8f0; padding: 16px; font-size: 14px;
    max-width: 900px; margin: 0 auto;
  }
  h1 { font-size: 20px; color: #f8fafc; margin-bottom: 4px; }
  .subtitle { color: #94a3b8; font-size: 12px; margin-bottom: 16px; }
  .section { margin-bottom: 20px; }
  .section-title {
    font-size: 15px; font-weight: 700; color: #38bdf8;
    border-bottom: 1px solid #1e293b; padding-bottom: 6px; margin-bottom: 10px;
  }
  table { width: 100%; border-collapse: collapse; margin-bottom: 8px; }
  th {
    background: #1e293b; color: #94a3b8; font-size: 11px; font-weight: 600;
    text-transform: uppercase; letter-spacing: 0.5px;
    padding: 8px 10px; text-align: left; border-bottom: 1px solid #334155;
  }
  td { padding: 7px 10px; border-bottom: 1px solid #1e293b; font-size: 13px; white-space: nowrap; }
  tr:hover { background: #1e293b; }
  .rate-name { color: #e2e8f0; font-weight: 500; }
  .rate-value { color: #f8fafc; font-weight: 700; font-family: 'SF Mono', 'Fira Code', monospace; }
  .unavailable { color: #f97316; font-weight: 600; }
  .source { color: #64748b; font-size: 11px; }
  .warning { background: #3b1d1d; border-left: 3px solid #ef4444; padding: 8px 12px; margin-bottom: 16px; }
  .warning li { margin-left: 16px; font-size: 12px; }
  .footer { color: #475569; font-size: 11px; margin-top: 16px; text-align: center; }
"#;

/// 報表上顯示的小數位數
pub(crate) fn precision(series: Series) -> usize {
    match series.source() {
        Source::Treasury | Source::Fred | Source::InteractiveBrokers | Source::Hkma => 2,
        Source::BankPrime | Source::DbsEsaver => 3,
        _ => 4,
    }
}

pub(crate) fn format_rate(series: Series, value: Decimal) -> String {
    format!("{:.*}{}", precision(series), value, series.unit().suffix())
}

pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

/// 漲為紅、跌為綠
fn change_badge(change: Option<Decimal>, unit: Unit) -> String {
    let change = match change {
        None => return format!(r#"<span style="color:{}">—</span>"#, COLOR_MUTED),
        Some(change) => change,
    };

    let (color, arrow) = if change.is_zero() {
        (COLOR_MUTED, "&#9644;")
    } else if change.is_sign_positive() {
        (COLOR_UP, "&#9650;")
    } else {
        (COLOR_DOWN, "&#9660;")
    };
    let sign = if change.is_sign_negative() && !change.is_zero() {
        ""
    } else {
        "+"
    };

    let places = match unit {
        Unit::Pips => 2,
        _ => 3,
    };

    format!(
        r#"<span style="color:{};font-weight:600">{} {}{:.*}{}</span>"#,
        color,
        arrow,
        sign,
        places,
        change,
        unit.suffix()
    )
}

/// 少於兩點時不畫
pub(crate) fn sparkline(values: &[Decimal]) -> String {
    let points: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    if points.len() < 2 {
        return String::new();
    }

    let min = points.iter().copied().fold(f64::INFINITY, f64::min);
    let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = if max > min { max - min } else { 1.0 };
    let last_index = (points.len() - 1) as f64;
    let y_of = |v: f64| SPARKLINE_HEIGHT - ((v - min) / range) * (SPARKLINE_HEIGHT - 2.0) - 1.0;

    let polyline = points
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{:.1},{:.1}", i as f64 / last_index * SPARKLINE_WIDTH, y_of(*v)))
        .collect::<Vec<_>>()
        .join(" ");

    let first = points[0];
    let last = points[points.len() - 1];
    let color = if last >= first { COLOR_DOWN } else { COLOR_UP };

    format!(
        r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" style="vertical-align:middle;display:inline-block"><polyline points="{p}" fill="none" stroke="{c}" stroke-width="1.5"/><circle cx="{cx:.1}" cy="{cy:.1}" r="2" fill="{c}"/></svg>"#,
        w = SPARKLINE_WIDTH,
        h = SPARKLINE_HEIGHT,
        p = polyline,
        c = color,
        cx = SPARKLINE_WIDTH,
        cy = y_of(last),
    )
}

fn value_cell(row: &Row) -> String {
    match (row.unavailable, row.latest) {
        (false, Some(latest)) => format!(
            r#"<td class="rate-value" title="{}">{}</td>"#,
            latest.date,
            format_rate(row.series, latest.value)
        ),
        (false, None) => format!(r#"<td style="color:{}">N/A</td>"#, COLOR_MUTED),
        (true, Some(latest)) => format!(
            r#"<td class="unavailable">Unavailable (last {} on {})</td>"#,
            format_rate(row.series, latest.value),
            latest.date
        ),
        (true, None) => r#"<td class="unavailable">Unavailable</td>"#.to_string(),
    }
}

fn section_sources(section: Section) -> String {
    let mut sources: Vec<&str> = section.series().map(|s| s.source().name()).collect();
    sources.dedup();
    sources.join(", ")
}

fn write_section(html: &mut String, section: Section, rows: &[Row]) {
    let _ = writeln!(html, r#"<div class="section">"#);
    let _ = writeln!(html, r#"  <div class="section-title">{}</div>"#, section.title());
    let _ = writeln!(html, "  <table>");
    let _ = writeln!(
        html,
        "    <thead><tr><th>Rate</th><th>Current</th><th>1d</th><th>7d</th><th>30d</th><th>Trend</th></tr></thead>"
    );
    let _ = writeln!(html, "    <tbody>");

    for row in rows {
        let _ = writeln!(
            html,
            r#"      <tr><td class="rate-name">{}</td>{}<td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
            row.series.name(),
            value_cell(row),
            change_badge(row.change_1d, row.series.unit()),
            change_badge(row.change_7d, row.series.unit()),
            change_badge(row.change_30d, row.series.unit()),
            sparkline(&row.sparkline)
        );
    }

    let _ = writeln!(html, "    </tbody>");
    let _ = writeln!(html, "  </table>");
    let _ = writeln!(
        html,
        r#"  <p class="source">Sources: {}</p>"#,
        section_sources(section)
    );
    let _ = writeln!(html, "</div>");
}

fn write_warnings(html: &mut String, report: &Report) {
    if report.failed_sources.is_empty() && report.stale.is_empty() {
        return;
    }

    let _ = writeln!(html, r#"<div class="warning">"#);

    if !report.failed_sources.is_empty() {
        let _ = writeln!(html, "  <p>Unavailable sources:</p>");
        let _ = writeln!(html, "  <ul>");
        for failed in &report.failed_sources {
            let _ = writeln!(
                html,
                "    <li>{}: {}</li>",
                failed.origin.name(),
                escape(&failed.reason)
            );
        }
        let _ = writeln!(html, "  </ul>");
    }

    if !report.stale.is_empty() {
        let _ = writeln!(html, "  <p>Stale series:</p>");
        let _ = writeln!(html, "  <ul>");
        for stale in &report.stale {
            let _ = writeln!(html, "    <li>{}</li>", escape(&stale.describe()));
        }
        let _ = writeln!(html, "  </ul>");
    }

    let _ = writeln!(html, "</div>");
}

pub fn render(report: &Report) -> String {
    let mut html = String::with_capacity(32 * 1024);
    let date = report.date.format("%Y-%m-%d");

    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, r#"<html lang="en">"#);
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, r#"<meta charset="UTF-8">"#);
    let _ = writeln!(
        html,
        r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#
    );
    let _ = writeln!(html, "<title>Interest Rate Monitor - {}</title>", date);
    let _ = writeln!(html, "<style>{}</style>", STYLE);
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "<h1>&#128200; Interest Rate Monitor</h1>");
    let _ = writeln!(
        html,
        r#"<p class="subtitle">Report date: {} (generated {})</p>"#,
        date,
        report.generated_at.format("%Y-%m-%d %H:%M")
    );

    write_warnings(&mut html, report);

    for (section, rows) in &report.sections {
        write_section(&mut html, *section, rows);
    }

    let _ = writeln!(
        html,
        r#"<div class="footer">rate_monitor &mdash; Automated Interest Rate Tracker<br>Data may be delayed. Not financial advice.</div>"#
    );
    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");

    html
}
