//! 编译后的过滤条件
//!
//! `CompiledFilter` 是编译器的输出，只交给存储层执行。内存存储直接调用
//! [`CompiledFilter::matches`]，关系型存储把它翻译成 SQL。

use crate::operators::Comparator;
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// 客户实体上实际存储的属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Spend,
    Visits,
    LastOrderDate,
}

impl Attribute {
    /// 存储中的列名
    pub fn column(self) -> &'static str {
        match self {
            Self::Spend => "spend",
            Self::Visits => "visits",
            Self::LastOrderDate => "last_order_date",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spend => "spend",
            Self::Visits => "visits",
            Self::LastOrderDate => "lastOrderDate",
        };
        write!(f, "{}", s)
    }
}

/// 过滤条件中的比较值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// 同类型值的比较，类型不同返回 None
    pub fn partial_cmp_with(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            // 精确比较，与数据库中 `spend > $1` 的结果一致
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Timestamp(t) => t.to_rfc3339(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// 可被过滤条件匹配的记录
pub trait FilterTarget {
    /// 读取属性值，未设置时返回 None
    fn attribute(&self, attribute: Attribute) -> Option<FilterValue>;
}

/// 编译后的过滤条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompiledFilter {
    /// 无约束，匹配全部记录
    MatchAll,
    And {
        clauses: Vec<CompiledFilter>,
    },
    Or {
        clauses: Vec<CompiledFilter>,
    },
    Compare {
        attribute: Attribute,
        comparator: Comparator,
        value: FilterValue,
    },
    /// 大小写不敏感的正则匹配，`pattern` 已转义
    Pattern {
        attribute: Attribute,
        pattern: String,
    },
}

impl CompiledFilter {
    pub fn compare(attribute: Attribute, comparator: Comparator, value: FilterValue) -> Self {
        Self::Compare {
            attribute,
            comparator,
            value,
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// 构建求值器，模式条件的正则只编译一次
    pub fn matcher(&self) -> FilterMatcher<'_> {
        FilterMatcher {
            root: MatchNode::build(self),
        }
    }

    /// 对单条记录求值
    ///
    /// 语义与文档数据库一致：属性缺失或类型不符时只有 `ne` 成立。
    /// 扫描多条记录时应复用 [`CompiledFilter::matcher`]。
    pub fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        self.matcher().matches(target)
    }

    /// 叶子谓词数量
    pub fn predicate_count(&self) -> usize {
        match self {
            Self::MatchAll => 0,
            Self::And { clauses } | Self::Or { clauses } => {
                clauses.iter().map(Self::predicate_count).sum()
            }
            Self::Compare { .. } | Self::Pattern { .. } => 1,
        }
    }
}

/// [`CompiledFilter`] 的求值器
pub struct FilterMatcher<'a> {
    root: MatchNode<'a>,
}

impl FilterMatcher<'_> {
    pub fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        self.root.matches(target)
    }
}

enum MatchNode<'a> {
    All,
    And(Vec<MatchNode<'a>>),
    Or(Vec<MatchNode<'a>>),
    Compare {
        attribute: Attribute,
        comparator: Comparator,
        value: &'a FilterValue,
    },
    /// 为 None 时正则构建失败，按不匹配处理
    Pattern {
        attribute: Attribute,
        regex: Option<Regex>,
    },
}

impl<'a> MatchNode<'a> {
    fn build(filter: &'a CompiledFilter) -> Self {
        match filter {
            CompiledFilter::MatchAll => Self::All,
            CompiledFilter::And { clauses } => Self::And(clauses.iter().map(Self::build).collect()),
            CompiledFilter::Or { clauses } => Self::Or(clauses.iter().map(Self::build).collect()),
            CompiledFilter::Compare {
                attribute,
                comparator,
                value,
            } => Self::Compare {
                attribute: *attribute,
                comparator: *comparator,
                value,
            },
            CompiledFilter::Pattern { attribute, pattern } => Self::Pattern {
                attribute: *attribute,
                regex: RegexBuilder::new(pattern).case_insensitive(true).build().ok(),
            },
        }
    }

    fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        match self {
            Self::All => true,
            Self::And(clauses) => clauses.iter().all(|c| c.matches(target)),
            Self::Or(clauses) => clauses.iter().any(|c| c.matches(target)),
            Self::Compare {
                attribute,
                comparator,
                value,
            } => {
                let ordering = target
                    .attribute(*attribute)
                    .and_then(|actual| actual.partial_cmp_with(value));

                match ordering {
                    Some(ordering) => comparator.test(ordering),
                    None => *comparator == Comparator::Ne,
                }
            }
            Self::Pattern { attribute, regex } => match (regex, target.attribute(*attribute)) {
                (Some(re), Some(actual)) => re.is_match(&actual.as_text()),
                _ => false,
            },
        }
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MatchAll => write!(f, "TRUE"),
            Self::And { clauses } | Self::Or { clauses } => {
                let joiner = if matches!(self, Self::And { .. }) {
                    " AND "
                } else {
                    " OR "
                };
                write!(f, "(")?;
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", joiner)?;
                    }
                    write!(f, "{}", clause)?;
                }
                write!(f, ")")
            }
            Self::Compare {
                attribute,
                comparator,
                value,
            } => write!(f, "{} {} {}", attribute, comparator, value),
            Self::Pattern { attribute, pattern } => write!(f, "{} ~* /{}/", attribute, pattern),
        }
    }
}
