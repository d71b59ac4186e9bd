//! 分群字段描述表
//!
//! 字段词汇是封闭的：新增字段只需要在 `FIELDS` 中加一行，校验器和编译器同时生效。

use crate::filter::Attribute;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 规则中可引用的字段，序列化形式是 `FIELDS` 中的名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    Spend,
    Visits,
    InactiveDays,
}

/// 字段值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
}

/// 字段到客户存储属性的映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMapping {
    /// 直接比较存储属性
    Direct(Attribute),
    /// 距离某个时间属性的天数，编译成对该属性的绝对时间比较
    DaysSince(Attribute),
}

/// 字段描述
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub name: &'static str,
    pub value_type: ValueType,
    pub mapping: FieldMapping,
}

/// 字段描述表，按 `Field` 声明顺序排列
pub const FIELDS: [FieldSpec; 3] = [
    FieldSpec {
        field: Field::Spend,
        name: "spend",
        value_type: ValueType::Number,
        mapping: FieldMapping::Direct(Attribute::Spend),
    },
    FieldSpec {
        field: Field::Visits,
        name: "visits",
        value_type: ValueType::Number,
        mapping: FieldMapping::Direct(Attribute::Visits),
    },
    FieldSpec {
        field: Field::InactiveDays,
        name: "inactiveDays",
        value_type: ValueType::Number,
        mapping: FieldMapping::DaysSince(Attribute::LastOrderDate),
    },
];

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        FIELDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.field)
    }

    pub fn spec(self) -> &'static FieldSpec {
        &FIELDS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn value_type(self) -> ValueType {
        self.spec().value_type
    }

    pub fn mapping(self) -> FieldMapping {
        self.spec().mapping
    }
}

impl TryFrom<String> for Field {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::from_name(&name).ok_or_else(|| format!("unknown field: {}", name))
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.name().to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_follows_declaration_order() {
        for (i, spec) in FIELDS.iter().enumerate() {
            assert_eq!(spec.field as usize, i, "{}", spec.name);
        }
    }

    #[test]
    fn test_name_lookup_is_case_sensitive() {
        assert_eq!(Field::from_name("spend"), Some(Field::Spend));
        assert_eq!(Field::from_name("inactiveDays"), Some(Field::InactiveDays));
        assert_eq!(Field::from_name("inactivedays"), None);
        assert_eq!(Field::from_name("age"), None);
    }

    #[test]
    fn test_inactive_days_maps_to_last_order_date() {
        assert_eq!(
            Field::InactiveDays.mapping(),
            FieldMapping::DaysSince(Attribute::LastOrderDate)
        );
        assert_eq!(Field::Spend.mapping(), FieldMapping::Direct(Attribute::Spend));
        assert_eq!(Field::Visits.mapping(), FieldMapping::Direct(Attribute::Visits));
    }

    #[test]
    fn test_serde_follows_table() {
        for spec in FIELDS.iter() {
            let value = serde_json::to_value(spec.field).unwrap();
            assert_eq!(value, serde_json::Value::from(spec.name));
            let back: Field = serde_json::from_value(value).unwrap();
            assert_eq!(back, spec.field);
        }
        assert!(serde_json::from_str::<Field>("\"age\"").is_err());
    }

    #[test]
    fn test_all_fields_are_numeric() {
        assert!(FIELDS.iter().all(|spec| spec.value_type == ValueType::Number));
    }
}
