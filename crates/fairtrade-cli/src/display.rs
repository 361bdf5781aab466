//! Terminal rendering for status, search hits and analyses.

use fairtrade_core::RetrievalResult;
use fairtrade_engine::{AnalysisResult, SystemStatus};

const PREVIEW_CHARS: usize = 160;

// ── Public API ──

pub fn print_status(status: &SystemStatus) {
    println!("=== 시스템 상태 ===");
    println!();

    println!("Corpus");
    row("path", status.corpus_path.display());
    match status.corpus_bytes {
        Some(bytes) => row("file", format_kb(bytes)),
        None => row("file", "없음 (법령 데이터를 먼저 수집하세요)"),
    }
    if let Some(laws) = status.laws_loaded {
        row("laws", laws);
    }

    println!("Index");
    row("dir", status.index_dir.display());
    row("persisted", yes_no(status.index_persisted));
    row("built", yes_no(status.index_built));
    if let Some(units) = status.units {
        row("units", units);
    }
    if let Some(built_at) = status.built_at {
        row("built_at", built_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    println!("Backends");
    row("embedding", &status.embedding_model);
    row("generation", &status.generation_model);
}

pub fn print_hits(hits: &[RetrievalResult]) {
    if hits.is_empty() {
        println!("관련 조문을 찾지 못했습니다.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("[{}] {}  (score {:.3})", i + 1, hit.unit.citation(), hit.score);
        println!("    {}", preview(&hit.unit.text, PREVIEW_CHARS));
    }
}

pub fn print_analysis(result: &AnalysisResult) {
    println!("=== 분석 결과 ===");
    println!();
    println!("{}", result.narrative.trim());

    if result.cited_units.is_empty() {
        return;
    }
    println!();
    println!("참고 조문");
    let mentioned = result.mentioned_units();
    for hit in &result.cited_units {
        let marker = if mentioned.iter().any(|u| u.unit_id == hit.unit.unit_id) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {:<40} {:.3}", hit.unit.citation(), hit.score);
    }
}

// ── Helpers ──

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<12} {value}");
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "예" } else { "아니오" }
}

fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

/// Single-line preview, cut at `max` characters.
fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("제1항\n  제2항", 20), "제1항 제2항");
        assert_eq!(preview(&"가".repeat(10), 4), "가가가가...");
    }

    #[test]
    fn sizes_in_kilobytes() {
        assert_eq!(format_kb(2048), "2.0 KB");
        assert_eq!(format_kb(1536), "1.5 KB");
    }
}
