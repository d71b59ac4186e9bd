//! 客户分群规则引擎
//!
//! 将用户在分群构建器中编写的嵌套 AND/OR 规则树校验并编译成客户存储可执行的过滤条件：
//! - 规则树结构与类型校验（一次返回全部错误）
//! - 字段/操作符描述表，校验器与编译器共用
//! - `inactiveDays` 相对天数到 `lastOrderDate` 绝对时间的转换（操作符反转）
//! - 编译结果的内存匹配，供内存存储和测试使用

pub mod compiler;
pub mod fields;
pub mod filter;
pub mod models;
pub mod operators;
pub mod validator;

pub use compiler::QueryCompiler;
pub use fields::{FIELDS, Field, FieldMapping, FieldSpec, ValueType};
pub use filter::{Attribute, CompiledFilter, FilterMatcher, FilterTarget, FilterValue};
pub use models::{Combinator, Condition, RuleGroup, RuleNode, RuleValue};
pub use operators::{Comparator, OPERATORS, Operator, OperatorKind, OperatorSpec};
pub use validator::validate_rules;
