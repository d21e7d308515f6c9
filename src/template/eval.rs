//! Template evaluation.
//!
//! Evaluation never fails: missing parameters read as `null`, and
//! operators applied to values of the wrong type yield `null` or `false`.

use super::{BinaryOp, CompiledTemplate, Expr, Function, Segment, UnaryOp};
use crate::dialect::DialectStrategy;
use crate::params::ParamView;
use serde_json::{Number, Value};
use std::cmp::Ordering;

impl CompiledTemplate {
    /// Render against parameters, escaping through `dialect`.
    pub fn render(&self, params: ParamView<'_>, dialect: &dyn DialectStrategy) -> String {
        let eval = Evaluator { params, dialect };
        let mut sql = String::new();
        for segment in self.segments() {
            match segment {
                Segment::Text(text) => sql.push_str(text),
                Segment::Expr(expr) => sql.push_str(&render_value(&eval.eval(expr))),
            }
        }
        sql
    }
}

/// Text form of a value as it appears in rendered SQL.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

struct Evaluator<'a> {
    params: ParamView<'a>,
    dialect: &'a dyn DialectStrategy,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Var(name) => self.params.get(name).clone(),
            Expr::Member(target, field) => match self.eval(target) {
                Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
                _ => Value::Null,
            },
            Expr::Index(target, index) => index_value(self.eval(target), &self.eval(index)),
            Expr::Unary(UnaryOp::Not, e) => Value::Bool(!is_truthy(&self.eval(e))),
            Expr::Unary(UnaryOp::Neg, e) => negate(&self.eval(e)),
            Expr::Binary(BinaryOp::And, l, r) => {
                Value::Bool(is_truthy(&self.eval(l)) && is_truthy(&self.eval(r)))
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                Value::Bool(is_truthy(&self.eval(l)) || is_truthy(&self.eval(r)))
            }
            Expr::Binary(op, l, r) => binary(*op, &self.eval(l), &self.eval(r)),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if is_truthy(&self.eval(cond)) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Elvis(value, fallback) => {
                let v = self.eval(value);
                if is_truthy(&v) { v } else { self.eval(fallback) }
            }
            Expr::Call(func, args) => {
                let arg = args.first().map(|a| self.eval(a)).unwrap_or(Value::Null);
                self.call(*func, &arg)
            }
        }
    }

    fn call(&self, func: Function, arg: &Value) -> Value {
        match func {
            Function::Escape => match arg {
                Value::Null => Value::Null,
                Value::String(s) => Value::String(self.dialect.escape_str(s)),
                Value::Array(items) => Value::String(self.join(items)),
                other => Value::String(self.dialect.escape_str(&render_value(other))),
            },
            Function::Join => match arg {
                Value::Null => Value::Null,
                Value::Array(items) => Value::String(self.join(items)),
                other => self.call(Function::Escape, other),
            },
            Function::JoinNumbers => match arg {
                Value::Null => Value::Null,
                Value::Array(items) => Value::String(join_numbers(items)),
                other => Value::String(join_numbers(std::slice::from_ref(other))),
            },
            Function::Size => Value::from(size(arg)),
        }
    }

    fn join(&self, items: &[Value]) -> String {
        let rendered: Vec<Option<String>> = items
            .iter()
            .map(|v| match v {
                Value::Null => None,
                other => Some(render_value(other)),
            })
            .collect();
        let refs: Vec<Option<&str>> = rendered.iter().map(|s| s.as_deref()).collect();
        self.dialect.join_escaped(&refs)
    }
}

fn join_numbers(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if s.trim().parse::<f64>().is_ok_and(f64::is_finite) => {
                Some(s.trim().to_string())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn size(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        _ => 1,
    }
}

fn index_value(target: Value, index: &Value) -> Value {
    match (target, index) {
        (Value::Array(mut items), Value::Number(n)) => match n.as_u64() {
            Some(i) if (i as usize) < items.len() => items.swap_remove(i as usize),
            _ => Value::Null,
        },
        (Value::Object(mut map), Value::String(key)) => map.remove(key).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn negate(value: &Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                Value::from(i)
            } else {
                float(n.as_f64().map(|f| -f))
            }
        }
        _ => Value::Null,
    }
}

fn float(f: Option<f64>) -> Value {
    f.and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(l, r)),
        BinaryOp::Lt => Value::Bool(compare(l, r) == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(compare(l, r), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(compare(l, r) == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            compare(l, r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => match (l, r) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) if x.checked_add(y).is_some() => Value::from(x + y),
                _ => float(a.as_f64().zip(b.as_f64()).map(|(x, y)| x + y)),
            },
            (Value::Null, Value::Null) => Value::Null,
            _ => Value::String(render_value(l) + &render_value(r)),
        },
        BinaryOp::Sub => match (l, r) {
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) if x.checked_sub(y).is_some() => Value::from(x - y),
                _ => float(a.as_f64().zip(b.as_f64()).map(|(x, y)| x - y)),
            },
            _ => Value::Null,
        },
        // short-circuiting forms are handled by the evaluator
        BinaryOp::And => Value::Bool(is_truthy(l) && is_truthy(r)),
        BinaryOp::Or => Value::Bool(is_truthy(l) || is_truthy(r)),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DefaultStrategy, MySqlStrategy};
    use crate::params::Params;
    use crate::template::compile;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render_with(template: &str, params: Value, dialect: &dyn DialectStrategy) -> String {
        let params: Params = serde_json::from_value(params).unwrap();
        compile(template)
            .unwrap()
            .render(ParamView::new(&params), dialect)
    }

    fn render(template: &str, params: Value) -> String {
        render_with(template, params, &DefaultStrategy)
    }

    #[test]
    fn test_text_unchanged() {
        let sql = "SELECT * FROM users WHERE a = 'x' AND b LIKE 'a\\_%'";
        assert_eq!(render(sql, json!({})), sql);
    }

    #[test]
    fn test_substitution() {
        assert_eq!(
            render("SELECT * FROM users WHERE id = $id LIMIT ${limit}", json!({"id": 7, "limit": 10})),
            "SELECT * FROM users WHERE id = 7 LIMIT 10"
        );
    }

    #[test]
    fn test_missing_optional_key() {
        let template = "SELECT * FROM users WHERE 1 = 1${name ? ' AND name = ' + escape(name) : ''}";
        assert_eq!(render(template, json!({})), "SELECT * FROM users WHERE 1 = 1");
        assert_eq!(
            render(template, json!({"name": "O'Brien"})),
            "SELECT * FROM users WHERE 1 = 1 AND name = O''Brien"
        );
    }

    #[test]
    fn test_missing_key_renders_empty() {
        assert_eq!(render("a=[$missing] b=[${x.y.z}]", json!({})), "a=[] b=[]");
    }

    #[test]
    fn test_mysql_escape_in_template() {
        assert_eq!(
            render_with(
                "WHERE name = ${name.escape()}",
                json!({"name": r"O'Br\ien"}),
                &MySqlStrategy
            ),
            r"WHERE name = 'O''Br\\ien'"
        );
    }

    #[test]
    fn test_join_for_in_clause() {
        let params = json!({"names": ["a", null, "b'c"], "ids": [1, null, "2", "x", 3.5]});
        assert_eq!(
            render_with("IN (${join(names)})", params.clone(), &MySqlStrategy),
            "IN ('a','b''c')"
        );
        assert_eq!(render("IN (${join(names)})", params.clone()), "IN (a,b''c)");
        assert_eq!(render("IN (${join_numbers(ids)})", params), "IN (1,2,3.5)");
    }

    #[test]
    fn test_escape_null_stays_null() {
        assert_eq!(
            render_with("[${escape(name)}]", json!({"name": null}), &MySqlStrategy),
            "[]"
        );
        assert_eq!(
            render_with("${escape(name) == null}", json!({}), &MySqlStrategy),
            "true"
        );
    }

    #[test]
    fn test_elvis_and_arithmetic() {
        assert_eq!(render("LIMIT ${limit ?: 10}", json!({})), "LIMIT 10");
        assert_eq!(render("LIMIT ${limit ?: 10}", json!({"limit": 5})), "LIMIT 5");
        assert_eq!(
            render("OFFSET ${(page - 1) + size}", json!({"page": 2, "size": 20})),
            "OFFSET 21"
        );
        assert_eq!(render("${page - 1}", json!({"page": 3})), "2");
        assert_eq!(render("${page - 1}", json!({"page": "3"})), "");
        assert_eq!(render("${-n}", json!({"n": 4})), "-4");
    }

    #[test]
    fn test_comparisons_and_logic() {
        let params = json!({"age": 21, "role": "admin", "flags": []});
        assert_eq!(render("${age >= 18 && role == 'admin'}", params.clone()), "true");
        assert_eq!(render("${age < 18 || !flags}", params.clone()), "true");
        assert_eq!(render("${role != 'admin'}", params.clone()), "false");
        assert_eq!(render("${age == 21.0}", params.clone()), "true");
        assert_eq!(render("${role > 5}", params), "false");
    }

    #[test]
    fn test_member_index_size() {
        let params = json!({"filter": {"ids": [10, 20], "name": "x"}});
        assert_eq!(render("${filter.ids[1]}", params.clone()), "20");
        assert_eq!(render("${filter['name']}", params.clone()), "x");
        assert_eq!(render("${size(filter.ids)}", params.clone()), "2");
        assert_eq!(render("${filter.ids[9]}", params), "");
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            render("${'a' + n + null}", json!({"n": 1})),
            "a1"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([0])));
    }
}
