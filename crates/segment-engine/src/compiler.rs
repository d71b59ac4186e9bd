//! 规则编译器
//!
//! 把规则树递归降级为 [`CompiledFilter`]。编译是全函数：残缺或无法转换的条件
//! 被丢弃而不是报错，错误上报完全由校验器负责，调用方必须先校验再编译。

use crate::fields::FieldMapping;
use crate::filter::{CompiledFilter, FilterValue};
use crate::models::{Combinator, Condition, RuleGroup, RuleNode};
use crate::operators::OperatorKind;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::debug;

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// 规则编译器
///
/// `now` 是唯一的外部输入：`inactiveDays` 条件相对它计算截止时间，
/// 所以同一棵树在不同时刻编译会得到不同的绝对时间。
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler {
    now: DateTime<Utc>,
}

impl QueryCompiler {
    /// 以给定时刻为基准的编译器
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// 以当前时刻为基准的编译器
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// 编译规则树；没有任何有效约束时返回 `MatchAll`
    pub fn compile(&self, node: &RuleNode) -> CompiledFilter {
        self.compile_node(node).unwrap_or(CompiledFilter::MatchAll)
    }

    /// 编译未经类型化的 JSON 规则树，`null` 视为空树
    pub fn compile_value(&self, rules: &Value) -> CompiledFilter {
        self.compile(&RuleNode::from_value(rules))
    }

    /// None 表示该节点不贡献约束，由父节点忽略
    fn compile_node(&self, node: &RuleNode) -> Option<CompiledFilter> {
        match node {
            RuleNode::Group(group) => self.compile_group(group),
            RuleNode::Condition(cond) => self.compile_condition(cond),
        }
    }

    fn compile_group(&self, group: &RuleGroup) -> Option<CompiledFilter> {
        let clauses: Vec<CompiledFilter> = group
            .rules
            .iter()
            .filter_map(|child| self.compile_node(child))
            .collect();

        // 空组不是恒真也不是恒假，而是向上传递“无约束”
        if clauses.is_empty() {
            return None;
        }

        Some(match group.combinator {
            Combinator::And => CompiledFilter::And { clauses },
            Combinator::Or => CompiledFilter::Or { clauses },
        })
    }

    fn compile_condition(&self, cond: &Condition) -> Option<CompiledFilter> {
        let (Some(field), Some(operator), Some(value)) = (cond.field, cond.operator, &cond.value)
        else {
            debug!(?cond, "Dropping incomplete condition");
            return None;
        };

        match (operator.spec().kind, field.mapping()) {
            (OperatorKind::Pattern, FieldMapping::Direct(attribute)) => {
                Some(CompiledFilter::Pattern {
                    attribute,
                    pattern: regex::escape(&value.as_text()),
                })
            }
            (OperatorKind::Pattern, FieldMapping::DaysSince(_)) => {
                debug!(%field, "Dropping pattern condition on a relative date field");
                None
            }
            (OperatorKind::Compare { comparator, .. }, FieldMapping::Direct(attribute)) => {
                let Some(number) = value.as_number() else {
                    debug!(%field, %value, "Dropping condition with non-numeric value");
                    return None;
                };
                Some(CompiledFilter::compare(
                    attribute,
                    comparator,
                    FilterValue::Number(number),
                ))
            }
            (OperatorKind::Compare { inverted, .. }, FieldMapping::DaysSince(attribute)) => {
                let Some(days) = value.as_number() else {
                    debug!(%field, %value, "Dropping condition with non-numeric value");
                    return None;
                };
                let Some(cutoff) = self.cutoff(days) else {
                    debug!(%field, days, "Dropping condition with out-of-range day count");
                    return None;
                };
                Some(CompiledFilter::compare(
                    attribute,
                    inverted,
                    FilterValue::Timestamp(cutoff),
                ))
            }
        }
    }

    /// `now - days`，按毫秒精度支持小数天
    fn cutoff(&self, days: f64) -> Option<DateTime<Utc>> {
        let millis = (days * MILLIS_PER_DAY).round();
        if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
            return None;
        }
        let offset = Duration::try_milliseconds(millis as i64)?;
        self.now.checked_sub_signed(offset)
    }
}
