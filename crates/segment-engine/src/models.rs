//! 规则树领域模型
//!
//! 规则树在请求进入时从 JSON 构造，形状与分群构建器提交的一致：
//! 分组节点带 `combinator` 和 `rules`，条件节点带 `field`/`operator`/`value`。

use crate::fields::Field;
use crate::operators::Operator;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// 规则节点（逻辑组或条件）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Condition(Condition),
}

/// 逻辑组合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    /// 严格解析，大小写不敏感
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("and") {
            Some(Self::And)
        } else if name.eq_ignore_ascii_case("or") {
            Some(Self::Or)
        } else {
            None
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// 逻辑组节点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleGroup {
    pub combinator: Combinator,
    pub rules: Vec<RuleNode>,
}

impl RuleGroup {
    pub fn new(combinator: Combinator, rules: Vec<RuleNode>) -> Self {
        Self { combinator, rules }
    }
}

/// 条件节点
///
/// 各部分在构造时可能缺失或无法识别（未经校验的输入），此时为 `None`，
/// 编译器会整体丢弃这样的条件。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RuleValue>,
}

impl Condition {
    pub fn new(field: Field, operator: Operator, value: impl Into<RuleValue>) -> Self {
        Self {
            field: Some(field),
            operator: Some(operator),
            value: Some(value.into()),
        }
    }

    /// 任何部分缺失的条件
    pub fn malformed() -> Self {
        Self {
            field: None,
            operator: None,
            value: None,
        }
    }
}

/// 条件值：用户输入的文本或 JSON 数字
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleValue {
    Number(f64),
    Text(String),
}

impl RuleValue {
    /// 从 JSON 标量构造；空白字符串视为缺失
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// 数值强制转换，只接受有限数
    pub fn as_number(&self) -> Option<f64> {
        let number = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        number.is_finite().then_some(number)
    }

    /// 文本形式，供模式匹配使用
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

impl From<f64> for RuleValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for RuleValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for RuleValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl RuleNode {
    pub fn and(rules: Vec<RuleNode>) -> Self {
        Self::Group(RuleGroup::new(Combinator::And, rules))
    }

    pub fn or(rules: Vec<RuleNode>) -> Self {
        Self::Group(RuleGroup::new(Combinator::Or, rules))
    }

    pub fn condition(field: Field, operator: Operator, value: impl Into<RuleValue>) -> Self {
        Self::Condition(Condition::new(field, operator, value))
    }

    /// 从未经校验的 JSON 构造规则树，总是成功
    ///
    /// 带 `combinator` 或 `rules`/`children` 键的对象是分组；分组的组合方式不是字符串、
    /// 或子节点不是数组时按残缺条件处理。组合方式除 `or` 外一律按 AND 处理，
    /// 严格检查由校验器负责。
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Condition(Condition::malformed());
        };

        let children = obj.get("rules").or_else(|| obj.get("children"));
        if obj.contains_key("combinator") || children.is_some() {
            let combinator = obj.get("combinator").and_then(Value::as_str);
            let rules = children.and_then(Value::as_array);

            return match (combinator, rules) {
                (Some(combinator), Some(rules)) => {
                    let combinator = if combinator.eq_ignore_ascii_case("or") {
                        Combinator::Or
                    } else {
                        Combinator::And
                    };
                    Self::Group(RuleGroup::new(
                        combinator,
                        rules.iter().map(Self::from_value).collect(),
                    ))
                }
                _ => Self::Condition(Condition::malformed()),
            };
        }

        Self::Condition(Condition {
            field: obj
                .get("field")
                .and_then(Value::as_str)
                .and_then(Field::from_name),
            operator: obj
                .get("operator")
                .and_then(Value::as_str)
                .and_then(Operator::from_symbol),
            value: obj.get("value").and_then(RuleValue::from_json),
        })
    }
}

impl<'de> Deserialize<'de> for RuleNode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
