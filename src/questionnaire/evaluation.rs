//! 本地评分：在提交分析前给出客观题得分
//!
//! 答案按 `q_{index}` 取值（index 从 0 开始）。空白答案记为未作答，开放题不评估，
//! 二者都不计入总数；列表型标准答案按成员判断，文本型要求答案以标准答案的第一个词开头。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::questionnaire::payload::{Correction, Question, QuestionType};

const UNANSWERED: &str = "Non répondu";
const NOT_EVALUATED: &str = "Non évalué (requiert une analyse humaine)";

/// 答案的键
pub fn answer_key(index: usize) -> String {
    format!("q_{index}")
}

/// 单题判定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
    Unanswered,
    NotEvaluated,
}

impl Verdict {
    /// 是否计入总数
    pub fn is_scored(&self) -> bool {
        matches!(self, Verdict::Correct | Verdict::Incorrect)
    }
}

// 线上格式：判定结果为布尔值，未作答 / 未评估为说明文字
impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Verdict::Correct => serializer.serialize_bool(true),
            Verdict::Incorrect => serializer.serialize_bool(false),
            Verdict::Unanswered => serializer.serialize_str(UNANSWERED),
            Verdict::NotEvaluated => serializer.serialize_str(NOT_EVALUATED),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerRecord {
    pub numero: u32,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub user_answer: String,
    pub correct_answer: Option<Correction>,
    pub is_correct: Verdict,
}

/// 评分结果，序列化后即测验分析任务的请求体
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationResult {
    /// `correct/total`
    pub score: String,
    pub score_percentage: f64,
    pub completed_at: DateTime<Utc>,
    pub questions_data: Vec<AnswerRecord>,
    #[serde(skip)]
    pub correct: usize,
    #[serde(skip)]
    pub total: usize,
}

pub fn evaluate(questions: &[Question], answers: &HashMap<String, String>) -> EvaluationResult {
    let questions_data: Vec<AnswerRecord> = questions
        .iter()
        .enumerate()
        .map(|(index, q)| {
            let user_answer = answers.get(&answer_key(index)).cloned().unwrap_or_default();
            AnswerRecord {
                numero: q.numero.unwrap_or(index as u32 + 1),
                question: q.question.clone(),
                question_type: q.question_type,
                options: q.options.clone(),
                is_correct: judge(q, &user_answer),
                user_answer,
                correct_answer: q.correction.clone(),
            }
        })
        .collect();

    let correct = questions_data
        .iter()
        .filter(|r| r.is_correct == Verdict::Correct)
        .count();
    let total = questions_data.iter().filter(|r| r.is_correct.is_scored()).count();
    let score_percentage = if total > 0 {
        (correct as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };

    EvaluationResult {
        score: format!("{correct}/{total}"),
        score_percentage,
        completed_at: Utc::now(),
        questions_data,
        correct,
        total,
    }
}

fn judge(question: &Question, answer: &str) -> Verdict {
    let answer = answer.trim();
    if answer.is_empty() {
        return Verdict::Unanswered;
    }
    if question.question_type.is_open() {
        return Verdict::NotEvaluated;
    }
    let hit = match &question.correction {
        Some(Correction::List(accepted)) => accepted.iter().any(|a| a.trim() == answer),
        Some(Correction::Text(text)) => match text.split_whitespace().next() {
            Some(first) => answer.starts_with(first),
            None => return Verdict::NotEvaluated,
        },
        None => return Verdict::NotEvaluated,
    };
    if hit {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn question(question_type: QuestionType, correction: Option<Correction>) -> Question {
        Question {
            numero: None,
            question: "q".to_string(),
            question_type,
            options: Vec::new(),
            correction,
        }
    }

    fn text(s: &str) -> Option<Correction> {
        Some(Correction::Text(s.to_string()))
    }

    fn answers(pairs: &[(usize, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(i, a)| (answer_key(*i), a.to_string())).collect()
    }

    #[test]
    fn test_score_excludes_unanswered_and_open() {
        let questions = vec![
            question(QuestionType::MultipleChoice, text("B. Paris")),
            question(QuestionType::TrueFalse, text("Vrai")),
            question(QuestionType::MultipleChoice, text("C. 12")),
            question(QuestionType::OpenQuestion, None),
        ];
        let result = evaluate(
            &questions,
            &answers(&[(0, "B. Paris"), (1, "Faux"), (2, "   "), (3, "long text")]),
        );

        assert_eq!(result.score, "1/2");
        assert_eq!(result.score_percentage, 50.0);
        assert_eq!(result.questions_data[2].is_correct, Verdict::Unanswered);
        assert_eq!(result.questions_data[3].is_correct, Verdict::NotEvaluated);
        assert_eq!(result.questions_data[3].numero, 4);
    }

    #[test]
    fn test_percentage_rounded_to_two_decimals() {
        let questions = vec![
            question(QuestionType::MultipleChoice, text("A")),
            question(QuestionType::MultipleChoice, text("A")),
            question(QuestionType::MultipleChoice, text("A")),
        ];
        let result = evaluate(&questions, &answers(&[(0, "A"), (1, "B"), (2, "B")]));
        assert_eq!(result.score, "1/3");
        assert_eq!(result.score_percentage, 33.33);
    }

    #[test]
    fn test_list_correction_uses_membership() {
        let list = Some(Correction::List(vec!["2".to_string(), "3".to_string()]));
        let questions = vec![
            question(QuestionType::MultipleChoice, list.clone()),
            question(QuestionType::MultipleChoice, list),
        ];
        let result = evaluate(&questions, &answers(&[(0, "3"), (1, "4")]));
        assert_eq!(result.correct, 1);
        assert_eq!(result.total, 2);
    }

    #[test]
    fn test_nothing_scored_gives_zero() {
        let questions = vec![question(QuestionType::OpenList, None)];
        let result = evaluate(&questions, &HashMap::new());
        assert_eq!(result.score, "0/0");
        assert_eq!(result.score_percentage, 0.0);
    }

    #[test]
    fn test_wire_format() {
        let questions = vec![
            question(QuestionType::MultipleChoice, text("A. yes")),
            question(QuestionType::MultipleChoice, text("A. yes")),
        ];
        let value = serde_json::to_value(evaluate(&questions, &answers(&[(0, "A")]))).unwrap();
        assert_eq!(value["questions_data"][0]["is_correct"], json!(true));
        assert_eq!(value["questions_data"][0]["type"], json!("ChoixMultiple"));
        assert_eq!(value["questions_data"][1]["is_correct"], json!(UNANSWERED));
        assert!(value.get("correct").is_none());
        assert_eq!(value["score"], json!("1/1"));
    }
}
