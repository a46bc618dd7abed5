//! Evaluation Parser
//!
//! Converts the loosely formatted evaluation report written by the language
//! model into an `EvaluationRecord`. The section labels below are the contract
//! with the prompt template in `prompts/evaluation.md`; change them together.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::LazyLock};

pub const SCORE_LABEL: &str = "점수";
pub const STRENGTHS_LABELS: &[&str] = &["평가", "강점"];
pub const IMPROVEMENT_LABELS: &[&str] = &["개선점", "개선할 점"];
pub const OVERALL_LABELS: &[&str] = &["종합 평가", "전체적인 학습 상태"];

static CATEGORY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\s*[.)]\s*(독해력|논리적 사고|창의적 표현|참여도)")
        .expect("category header pattern is valid")
});
static SCORE_OUT_OF_TEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*/\s*10").expect("score pattern is valid"));
static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("integer pattern is valid"));

/// The fixed set of skills the report scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationCategory {
    #[serde(rename = "독해력")]
    ReadingComprehension,
    #[serde(rename = "논리적 사고")]
    LogicalThinking,
    #[serde(rename = "창의적 표현")]
    CreativeExpression,
    #[serde(rename = "참여도")]
    Participation,
}

impl EvaluationCategory {
    pub const ALL: [EvaluationCategory; 4] = [
        EvaluationCategory::ReadingComprehension,
        EvaluationCategory::LogicalThinking,
        EvaluationCategory::CreativeExpression,
        EvaluationCategory::Participation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EvaluationCategory::ReadingComprehension => "독해력",
            EvaluationCategory::LogicalThinking => "논리적 사고",
            EvaluationCategory::CreativeExpression => "창의적 표현",
            EvaluationCategory::Participation => "참여도",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

impl fmt::Display for EvaluationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scores and remarks for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEvaluation {
    pub category: EvaluationCategory,
    /// Expected 1-10 but carried through unvalidated; 0 means no score line.
    pub score: u32,
    pub strengths: String,
    pub improvements: String,
}

/// Structured form of one evaluation report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    /// Categories in the order they appear in the report. Repeated categories
    /// are kept as separate entries.
    pub entries: Vec<CategoryEvaluation>,
    pub overall_comment: String,
}

impl EvaluationRecord {
    /// First entry for `category`, if the report scored it.
    pub fn entry(&self, category: EvaluationCategory) -> Option<&CategoryEvaluation> {
        self.entries.iter().find(|e| e.category == category)
    }

    /// Mean of the scored entries, ignoring entries without a score.
    pub fn average_score(&self) -> Option<f32> {
        let scores: Vec<u32> = self
            .entries
            .iter()
            .map(|e| e.score)
            .filter(|s| *s > 0)
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<u32>() as f32 / scores.len() as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Score,
    Strengths,
    Improvement,
    Overall,
}

struct OpenBlock {
    category: EvaluationCategory,
    score: u32,
    strengths: Vec<String>,
    improvements: Vec<String>,
}

impl OpenBlock {
    fn new(category: EvaluationCategory) -> Self {
        Self {
            category,
            score: 0,
            strengths: Vec::new(),
            improvements: Vec::new(),
        }
    }

    fn close(self) -> CategoryEvaluation {
        CategoryEvaluation {
            category: self.category,
            score: self.score,
            strengths: self.strengths.join("\n"),
            improvements: self.improvements.join("\n"),
        }
    }
}

/// Strips list bullets, headings and bold markers so labels can be matched.
fn normalize(line: &str) -> String {
    line.replace("**", "")
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c.is_whitespace())
        .to_string()
}

/// If `line` starts with one of `labels` followed by a colon, returns the
/// text after the colon.
fn label_remainder<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    labels.iter().find_map(|label| {
        let rest = line.strip_prefix(label)?.trim_start();
        let rest = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))?;
        Some(rest.trim())
    })
}

/// Like `label_remainder`, but a line that is nothing but the label (a
/// heading such as `**개선점**`) also opens the section.
fn section_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    label_remainder(line, labels)
        .or_else(|| labels.iter().any(|label| *label == line).then_some(""))
}

/// If `line` mentions an overall-assessment label, returns whatever follows
/// the first colon after it.
fn overall_remainder(line: &str) -> Option<&str> {
    let (idx, label) = OVERALL_LABELS
        .iter()
        .find_map(|label| line.find(label).map(|idx| (idx, *label)))?;
    let after = &line[idx + label.len()..];
    Some(
        after
            .find([':', '：'])
            .map(|colon| after[colon..].trim_start_matches([':', '：']).trim())
            .unwrap_or(""),
    )
}

fn category_header(line: &str) -> Option<EvaluationCategory> {
    CATEGORY_HEADER
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| EvaluationCategory::from_label(m.as_str()))
}

fn is_score_line(line: &str) -> bool {
    label_remainder(line, &[SCORE_LABEL]).is_some()
        || line.contains(&format!("{SCORE_LABEL}:"))
        || SCORE_OUT_OF_TEN.is_match(line)
}

fn first_integer(line: &str) -> Option<u32> {
    INTEGER.find(line).and_then(|m| m.as_str().parse().ok())
}

/// Parses a raw evaluation report.
///
/// Never fails: unknown lines outside an open remark section are dropped,
/// missing sections come out empty, and a category without a score line is
/// still emitted with a score of 0. Once the overall-assessment label has been
/// seen, every remaining line belongs to the overall comment.
pub fn parse_evaluation(raw: &str) -> EvaluationRecord {
    let mut entries = Vec::new();
    let mut block: Option<OpenBlock> = None;
    let mut section = Section::None;
    let mut overall: Vec<String> = Vec::new();

    for line in raw.lines() {
        if section == Section::Overall {
            overall.push(line.trim_end().to_string());
            continue;
        }

        let clean = normalize(line);
        if let Some(category) = category_header(&clean) {
            entries.extend(block.take().map(OpenBlock::close));
            block = Some(OpenBlock::new(category));
            section = Section::None;
        } else if let Some(rest) = overall_remainder(&clean) {
            entries.extend(block.take().map(OpenBlock::close));
            section = Section::Overall;
            if !rest.is_empty() {
                overall.push(rest.to_string());
            }
        } else if is_score_line(&clean) {
            if let (Some(open), Some(score)) = (block.as_mut(), first_integer(&clean)) {
                open.score = score;
            }
            section = Section::Score;
        } else if let Some(rest) = section_label(&clean, STRENGTHS_LABELS) {
            section = Section::Strengths;
            if let Some(open) = block.as_mut().filter(|_| !rest.is_empty()) {
                open.strengths.push(rest.to_string());
            }
        } else if let Some(rest) = section_label(&clean, IMPROVEMENT_LABELS) {
            section = Section::Improvement;
            if let Some(open) = block.as_mut().filter(|_| !rest.is_empty()) {
                open.improvements.push(rest.to_string());
            }
        } else if !line.trim().is_empty()
            && let Some(open) = block.as_mut()
        {
            match section {
                Section::Strengths => open.strengths.push(line.trim().to_string()),
                Section::Improvement => open.improvements.push(line.trim().to_string()),
                _ => {}
            }
        }
    }
    entries.extend(block.take().map(OpenBlock::close));

    EvaluationRecord {
        entries,
        overall_comment: overall.join("\n").trim().to_string(),
    }
}
