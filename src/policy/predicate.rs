//! 触发条件求值
//!
//! 三类子句（match / anyTrue / threshold）之间为 AND；没有任何子句的触发条件不匹配。

use serde_json::Value;

use crate::core::Observation;
use crate::policy::Triggers;

/// 观测是否满足触发条件
pub fn matches(observation: &Observation, triggers: Option<&Triggers>) -> bool {
    let Some(t) = triggers else {
        return false;
    };
    if !t.has_clauses() {
        return false;
    }

    if let Some(exact) = &t.exact {
        let all_equal = exact
            .iter()
            .all(|(k, v)| observation.get(k).is_some_and(|o| values_equal(o, v)));
        if !all_equal {
            return false;
        }
    }

    if let Some(paths) = &t.any_true {
        if !paths
            .iter()
            .any(|p| observation.get(&p.path).is_some_and(is_truthy))
        {
            return false;
        }
    }

    if let Some(th) = &t.threshold {
        if let Some(gte) = th.gte {
            let reached = observation
                .get(&th.key)
                .and_then(as_number)
                .is_some_and(|n| n >= gte);
            if !reached {
                return false;
            }
        }
    }

    true
}

/// 标量相等；数字按数值比较（1 与 1.0 相等），对象与数组不视为相等
fn values_equal(observed: &Value, expected: &Value) -> bool {
    match (observed, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(_), _) | (Value::Object(_), _) => false,
        (a, b) => a == b,
    }
}

/// 真值判定：false / null / 0 / NaN / 空字符串为假，其余为真
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 数值强制转换：数字、数字字符串、布尔
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}
