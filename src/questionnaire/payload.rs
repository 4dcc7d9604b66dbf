//! 题目生成结果的解析
//!
//! 生成任务的 result 形状并不固定，按优先级依次尝试：
//! 1. `json` 字段本身是数组
//! 2. `json` 字段是包含数组的字符串（可能带 ```json 代码围栏）
//! 3. `question` 字段是包含数组的字符串
//! 4. 任一数组字段，且元素都是带 `question` 键的对象
//!
//! 元素逐个解析：`null` 字段按缺省处理，编号可以是字符串，无法解析的元素跳过。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 题型（线上取值沿用后端的法文枚举）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuestionType {
    #[default]
    #[serde(rename = "ChoixMultiple")]
    MultipleChoice,
    #[serde(rename = "VraiOuFaux")]
    TrueFalse,
    #[serde(rename = "QuestionOuverte")]
    OpenQuestion,
    #[serde(rename = "ListeOuverte")]
    OpenList,
    #[serde(other)]
    Unknown,
}

impl QuestionType {
    /// 开放题只能人工评估
    pub fn is_open(&self) -> bool {
        matches!(self, QuestionType::OpenQuestion | QuestionType::OpenList)
    }
}

/// 标准答案：单个文本或可接受答案列表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Correction {
    Text(String),
    List(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "lenient_numero")]
    pub numero: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub question_type: QuestionType,
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "lenient_correction")]
    pub correction: Option<Correction>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 编号接受整数或数字字符串，其余视为缺失
fn lenient_numero<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let numero = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(numero)
}

/// 选项里的数字转成文本，其他非字符串元素丢弃
fn lenient_options<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let options = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(options)
}

fn lenient_correction<'de, D>(deserializer: D) -> Result<Option<Correction>, D::Error>
where
    D: Deserializer<'de>,
{
    let correction = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Some(Correction::Text(n.to_string())),
        Some(Value::Bool(b)) => Some(Correction::Text(b.to_string())),
        Some(raw) => serde_json::from_value(raw).ok(),
        None => None,
    };
    Ok(correction)
}

/// 从生成结果中提取题目列表；找不到时返回 None
pub fn parse_questions_payload(result: &Value) -> Option<Vec<Question>> {
    let obj = result.as_object()?;

    let candidate = obj
        .get("json")
        .and_then(Value::as_array)
        .cloned()
        .or_else(|| obj.get("json").and_then(Value::as_str).and_then(array_from_text))
        .or_else(|| obj.get("question").and_then(Value::as_str).and_then(array_from_text))
        .or_else(|| {
            obj.values()
                .filter_map(Value::as_array)
                .find(|list| !list.is_empty() && list.iter().all(|item| item.get("question").is_some()))
                .cloned()
        })?;

    let total = candidate.len();
    let questions: Vec<Question> = candidate
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Question>(item) {
            Ok(question) => Some(question),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed question");
                None
            }
        })
        .collect();

    if questions.is_empty() && total > 0 {
        tracing::warn!(total, "Question list has unexpected shape");
        return None;
    }
    Some(questions)
}

fn array_from_text(text: &str) -> Option<Vec<Value>> {
    let cleaned = strip_code_fence(text);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Array(items)) => Some(items),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Embedded question text is not JSON");
            None
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Value {
        json!([
            {"numero": 1, "question": "2 + 2 ?", "type": "ChoixMultiple", "options": ["A. 3", "B. 4"], "correction": "B. 4"},
            {"numero": 2, "question": "Name two primes", "type": "ListeOuverte"}
        ])
    }

    #[test]
    fn test_json_array_has_priority() {
        let payload = json!({"json": sample(), "question": "[]"});
        let questions = parse_questions_payload(&payload).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question_type, QuestionType::MultipleChoice);
        assert_eq!(questions[0].correction, Some(Correction::Text("B. 4".to_string())));
        assert_eq!(questions[1].question_type, QuestionType::OpenList);
        assert!(questions[1].options.is_empty());
    }

    #[test]
    fn test_json_string_with_code_fence() {
        let text = format!("```json\n{}\n```", sample());
        let questions = parse_questions_payload(&json!({"json": text})).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_question_string_fallback() {
        let payload = json!({"json": "not json", "question": sample().to_string()});
        let questions = parse_questions_payload(&payload).unwrap();
        assert_eq!(questions[0].numero, Some(1));
    }

    #[test]
    fn test_any_array_of_questions() {
        let payload = json!({"tags": ["x"], "items": sample()});
        let questions = parse_questions_payload(&payload).unwrap();
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn test_nothing_found() {
        assert!(parse_questions_payload(&json!({"items": []})).is_none());
        assert!(parse_questions_payload(&json!({"items": [{"text": "no"}]})).is_none());
        assert!(parse_questions_payload(&json!("plain")).is_none());
        assert!(parse_questions_payload(&Value::Null).is_none());
    }

    #[test]
    fn test_unknown_type_and_list_correction() {
        let payload = json!({"json": [{"question": "q", "type": "Dessin", "correction": ["a", "b"]}]});
        let questions = parse_questions_payload(&payload).unwrap();
        assert_eq!(questions[0].question_type, QuestionType::Unknown);
        assert_eq!(
            questions[0].correction,
            Some(Correction::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_null_fields_and_bad_items_do_not_sink_the_list() {
        let payload = json!({"json": [
            {"numero": "1", "question": "Explain ownership", "type": "QuestionOuverte", "options": null, "correction": null},
            "not a question",
            {"numero": 2, "question": null, "type": null, "options": ["A. yes", 4, null], "correction": 4},
            {"numero": "two", "question": "Borrowing?", "type": "VraiOuFaux", "options": ["Vrai", "Faux"], "correction": "Vrai"}
        ]});
        let questions = parse_questions_payload(&payload).unwrap();
        assert_eq!(questions.len(), 3);

        assert_eq!(questions[0].numero, Some(1));
        assert!(questions[0].options.is_empty());
        assert_eq!(questions[0].correction, None);
        assert!(questions[0].question_type.is_open());

        assert_eq!(questions[1].question, "");
        assert_eq!(questions[1].question_type, QuestionType::MultipleChoice);
        assert_eq!(questions[1].options, vec!["A. yes".to_string(), "4".to_string()]);
        assert_eq!(questions[1].correction, Some(Correction::Text("4".to_string())));

        assert_eq!(questions[2].numero, None);
        assert_eq!(questions[2].question_type, QuestionType::TrueFalse);
    }

    #[test]
    fn test_all_items_malformed_is_not_found() {
        let payload = json!({"json": ["a", 1, null]});
        assert!(parse_questions_payload(&payload).is_none());
    }
}
