//! 规则树校验器
//!
//! 在规则进入编译器和存储层之前做结构与类型检查。校验不会在第一个错误处停止，
//! 而是返回全部错误，方便前端一次性标出所有问题。

use crate::fields::{Field, ValueType};
use crate::models::{Combinator, RuleValue};
use crate::operators::Operator;
use serde_json::Value;

/// 校验未经信任的规则树，返回空列表表示通过
pub fn validate_rules(rules: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if rules.is_object() {
        validate_node(rules, &mut errors);
    } else {
        errors.push("Invalid query: not an object".to_string());
    }

    errors
}

fn validate_node(node: &Value, errors: &mut Vec<String>) {
    let Some(obj) = node.as_object() else {
        errors.push("Invalid rule node: not an object".to_string());
        return;
    };

    let children = obj.get("rules").or_else(|| obj.get("children"));
    if obj.contains_key("combinator") || children.is_some() {
        let combinator = obj.get("combinator").and_then(Value::as_str);
        let Some((combinator, children)) = combinator.zip(children.and_then(Value::as_array))
        else {
            errors.push("Invalid group node: missing combinator or rules array".to_string());
            return;
        };

        if Combinator::from_name(combinator).is_none() {
            errors.push(format!("Invalid combinator: {}", combinator));
        }

        // 组合方式非法时仍然检查子节点
        for child in children {
            validate_node(child, errors);
        }
        return;
    }

    validate_condition(obj, errors);
}

fn validate_condition(obj: &serde_json::Map<String, Value>, errors: &mut Vec<String>) {
    let field_name = obj.get("field").and_then(non_empty_str);
    let operator_symbol = obj.get("operator").and_then(non_empty_str);
    let label = field_name.unwrap_or("undefined");

    let field = match field_name {
        None => {
            errors.push("Missing field in rule".to_string());
            None
        }
        Some(name) => {
            let field = Field::from_name(name);
            if field.is_none() {
                errors.push(format!("Unknown field: {}", name));
            }
            field
        }
    };

    match operator_symbol {
        None => errors.push(format!("Missing operator for field: {}", label)),
        Some(symbol) => {
            let exposed = Operator::from_symbol(symbol).is_some_and(Operator::is_exposed);
            if !exposed {
                errors.push(format!("Invalid operator {} for field {}", symbol, label));
            }
        }
    }

    let value = obj.get("value").filter(|v| !v.is_null());
    let Some(raw) = value else {
        errors.push(format!("Missing value for field: {}", label));
        return;
    };

    match RuleValue::from_json(raw) {
        None if raw.as_str().is_some_and(|s| s.trim().is_empty()) => {
            errors.push(format!("Missing value for field: {}", label));
        }
        parsed => {
            // 未知字段没有类型信息，不做类型检查
            if let Some(field) = field
                && field.value_type() == ValueType::Number
                && parsed.as_ref().and_then(RuleValue::as_number).is_none()
            {
                errors.push(format!(
                    "Invalid numeric value for {}: {}",
                    field,
                    display_raw(raw)
                ));
            }
        }
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
