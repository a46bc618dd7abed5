use std::fmt::Write;
use tutor_core::EvaluationRecord;

/// Formats a parsed report for the terminal.
pub fn render_report(record: &EvaluationRecord) -> String {
    let mut out = String::new();
    for entry in &record.entries {
        let _ = writeln!(out, "[{}] {}/10", entry.category, entry.score);
        if !entry.strengths.is_empty() {
            let _ = writeln!(out, "  강점: {}", entry.strengths.replace('\n', "\n        "));
        }
        if !entry.improvements.is_empty() {
            let _ = writeln!(
                out,
                "  개선점: {}",
                entry.improvements.replace('\n', "\n          ")
            );
        }
    }
    if let Some(average) = record.average_score() {
        let _ = writeln!(out, "평균 점수: {average:.1}");
    }
    if !record.overall_comment.is_empty() {
        let _ = writeln!(out, "종합 평가: {}", record.overall_comment);
    }
    out.trim_end().to_string()
}
