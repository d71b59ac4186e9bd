//! 规则操作符定义
//!
//! 操作符到比较器的映射以及日期反转映射都放在 `OPERATORS` 描述表里，
//! 校验器和编译器都只查表，不再各自维护分支。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 规则树中用户可写的操作符
///
/// 序列化形式是 `OPERATORS` 中的符号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
    Ne,
    /// 大小写不敏感的子串匹配，编译器支持但不对终端用户开放
    Contains,
}

/// 编译后过滤条件使用的比较器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
    Ne,
}

/// 操作符的编译方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// 直接比较；`inverted` 是作用在日期字段上时使用的比较器
    Compare {
        comparator: Comparator,
        inverted: Comparator,
    },
    /// 模式匹配（转义后的正则）
    Pattern,
}

/// 操作符描述
#[derive(Debug, Clone, Copy)]
pub struct OperatorSpec {
    pub operator: Operator,
    pub symbol: &'static str,
    pub kind: OperatorKind,
    /// 是否允许出现在用户提交的规则中
    pub exposed: bool,
}

const fn compare(
    operator: Operator,
    symbol: &'static str,
    comparator: Comparator,
    inverted: Comparator,
) -> OperatorSpec {
    OperatorSpec {
        operator,
        symbol,
        kind: OperatorKind::Compare {
            comparator,
            inverted,
        },
        exposed: true,
    }
}

/// 操作符描述表
///
/// `inactiveDays > N` 表示最后下单早于 `now - N 天`，所以作用在日期上时比较方向反转，
/// `=` 和 `!=` 反转后不变。
pub const OPERATORS: [OperatorSpec; 7] = [
    compare(Operator::Gt, ">", Comparator::Gt, Comparator::Lt),
    compare(Operator::Lt, "<", Comparator::Lt, Comparator::Gt),
    compare(Operator::Eq, "=", Comparator::Eq, Comparator::Eq),
    compare(Operator::Gte, ">=", Comparator::Gte, Comparator::Lte),
    compare(Operator::Lte, "<=", Comparator::Lte, Comparator::Gte),
    compare(Operator::Ne, "!=", Comparator::Ne, Comparator::Ne),
    OperatorSpec {
        operator: Operator::Contains,
        symbol: "contains",
        kind: OperatorKind::Pattern,
        exposed: false,
    },
];

impl Operator {
    /// 按符号查找操作符（包括未开放的）
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        OPERATORS
            .iter()
            .find(|spec| spec.symbol == symbol)
            .map(|spec| spec.operator)
    }

    pub fn spec(self) -> &'static OperatorSpec {
        // OPERATORS 按枚举声明顺序排列
        &OPERATORS[self as usize]
    }

    pub fn symbol(self) -> &'static str {
        self.spec().symbol
    }

    pub fn is_exposed(self) -> bool {
        self.spec().exposed
    }

    /// 直接比较时使用的比较器，模式匹配返回 None
    pub fn comparator(self) -> Option<Comparator> {
        match self.spec().kind {
            OperatorKind::Compare { comparator, .. } => Some(comparator),
            OperatorKind::Pattern => None,
        }
    }

    /// 作用在日期字段上时使用的比较器
    pub fn inverted_comparator(self) -> Option<Comparator> {
        match self.spec().kind {
            OperatorKind::Compare { inverted, .. } => Some(inverted),
            OperatorKind::Pattern => None,
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(symbol: String) -> Result<Self, Self::Error> {
        Self::from_symbol(&symbol).ok_or_else(|| format!("unknown operator: {}", symbol))
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.symbol().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl Comparator {
    /// 对 `Ordering` 求值
    pub fn test(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Self::Gt => ordering == Greater,
            Self::Lt => ordering == Less,
            Self::Eq => ordering == Equal,
            Self::Gte => ordering != Less,
            Self::Lte => ordering != Greater,
            Self::Ne => ordering != Equal,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Ne => "<>",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Eq => "eq",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Ne => "ne",
        };
        write!(f, "{}", s)
    }
}
